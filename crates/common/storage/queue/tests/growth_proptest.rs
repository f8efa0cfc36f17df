// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Model-based tests: random operation sequences against a `VecDeque`.
//!
//! Queues start at the minimum capacity so that most sequences wrap the
//! data region and then grow while wrapped.

use std::collections::VecDeque;

use proptest::prelude::*;
use spool_queue::{OffsetCachePolicy, QueueBuilder, QueueFile};
use tempfile::TempDir;

const PROPTEST_CASES: u32 = 64;

#[derive(Debug, Clone)]
enum Op {
    Add(Vec<u8>),
    AddN(Vec<Vec<u8>>),
    Remove,
    RemoveN(usize),
    Peek,
    Clear,
    Reopen,
}

fn payload() -> impl Strategy<Value = Vec<u8>> { prop::collection::vec(any::<u8>(), 0..48) }

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => payload().prop_map(Op::Add),
        2 => prop::collection::vec(payload(), 0..6).prop_map(Op::AddN),
        4 => Just(Op::Remove),
        2 => (1usize..5).prop_map(Op::RemoveN),
        2 => Just(Op::Peek),
        1 => Just(Op::Reopen),
        1 => Just(Op::Clear),
    ]
}

fn cache_policy() -> impl Strategy<Value = OffsetCachePolicy> {
    prop_oneof![
        Just(OffsetCachePolicy::None),
        Just(OffsetCachePolicy::Lazy),
        Just(OffsetCachePolicy::Eager),
    ]
}

fn open(temp_dir: &TempDir, policy: OffsetCachePolicy) -> QueueFile {
    QueueBuilder::new(temp_dir.path().join("model.qf"))
        .initial_capacity(64)
        .sync_writes(false)
        .offset_cache(policy)
        .open()
        .unwrap()
}

fn contents(queue: &mut QueueFile) -> Vec<Vec<u8>> {
    queue
        .get_all()
        .unwrap()
        .into_iter()
        .map(|b| b.to_vec())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn prop_sequence_matches_vecdeque(
        ops in prop::collection::vec(op(), 1..120),
        policy in cache_policy(),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut queue = open(&temp_dir, policy);
        let mut model: VecDeque<Vec<u8>> = VecDeque::new();

        for op in ops {
            match op {
                Op::Add(p) => {
                    queue.add(&p).unwrap();
                    model.push_back(p);
                }
                Op::AddN(ps) => {
                    queue.add_n(&ps).unwrap();
                    model.extend(ps);
                }
                Op::Remove => {
                    if model.pop_front().is_some() {
                        queue.remove().unwrap();
                    } else {
                        prop_assert!(queue.remove().is_err());
                    }
                }
                Op::RemoveN(n) => {
                    if n <= model.len() {
                        queue.remove_n(n).unwrap();
                        model.drain(..n);
                    } else {
                        prop_assert!(queue.remove_n(n).is_err());
                    }
                }
                Op::Peek => {
                    let head = queue.peek().unwrap().map(|b| b.to_vec());
                    prop_assert_eq!(head.as_ref(), model.front());
                }
                Op::Clear => {
                    queue.clear().unwrap();
                    model.clear();
                }
                Op::Reopen => {
                    queue.sync_all().unwrap();
                    drop(queue);
                    queue = open(&temp_dir, policy);
                }
            }

            prop_assert_eq!(queue.size(), model.len());
            prop_assert!(queue.used_bytes() <= queue.file_len());
        }

        prop_assert_eq!(contents(&mut queue), Vec::from(model.clone()));

        drop(queue);
        let mut reopened = open(&temp_dir, OffsetCachePolicy::None);
        prop_assert_eq!(contents(&mut reopened), Vec::from(model));
    }

    /// Drains most of a full queue, refills past the end of the region, then
    /// forces one growth while the tail is wrapped.
    #[test]
    fn prop_growth_while_wrapped_preserves_order(
        prefill in prop::collection::vec(payload(), 1..8),
        drain in 0usize..8,
        refill in prop::collection::vec(payload(), 1..8),
        trigger in prop::collection::vec(any::<u8>(), 1..200),
    ) {
        let temp_dir = TempDir::new().unwrap();
        let mut queue = open(&temp_dir, OffsetCachePolicy::Eager);
        let mut model: VecDeque<Vec<u8>> = VecDeque::new();

        for p in prefill {
            queue.add(&p).unwrap();
            model.push_back(p);
        }
        let drain = drain.min(model.len());
        if drain > 0 {
            queue.remove_n(drain).unwrap();
            model.drain(..drain);
        }
        for p in refill {
            queue.add(&p).unwrap();
            model.push_back(p);
        }
        queue.add(&trigger).unwrap();
        model.push_back(trigger);

        prop_assert_eq!(contents(&mut queue), Vec::from(model.clone()));
        let mut iter = queue.iter();
        let last = iter.nth(model.len() - 1).unwrap().unwrap();
        prop_assert_eq!(last.to_vec(), model.back().cloned().unwrap());
    }
}
