//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small range so generated units collide often
//! enough to hit every constraint the demonstration schemas declare.

use crate::fixtures::{
    Backend, ACTED_IN, MOVIE_LABEL, PERSON_COLLECTION, PERSON_EVENT_COLLECTION,
    PERSON_EVENT_TABLE, PERSON_LABEL, PERSON_TABLE,
};
use proptest::prelude::*;
use rxtx_core::TransactionMode;
use rxtx_resource::{Operation, FROM, TO};

/// Strategy for keys in `1..=4`.
pub fn key_strategy() -> impl Strategy<Value = i64> {
    1..=4i64
}

/// Strategy for short person names, few enough to repeat.
pub fn name_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["Jesse", "Walter", "Skyler", "Saul"])
}

/// Strategy for the three demarcation modes.
pub fn mode_strategy() -> impl Strategy<Value = TransactionMode> {
    prop_oneof![
        Just(TransactionMode::AutoCommit),
        Just(TransactionMode::Explicit),
        Just(TransactionMode::Declarative),
    ]
}

/// Strategy for the atomic demarcation modes.
pub fn atomic_mode_strategy() -> impl Strategy<Value = TransactionMode> {
    prop_oneof![
        Just(TransactionMode::Explicit),
        Just(TransactionMode::Declarative),
    ]
}

fn relational_operation() -> BoxedStrategy<Operation> {
    prop_oneof![
        3 => (key_strategy(), name_strategy()).prop_map(|(key, name)| {
            Operation::insert(PERSON_TABLE, key).with("first_name", name)
        }),
        1 => (key_strategy(), name_strategy()).prop_map(|(key, name)| {
            Operation::update(PERSON_TABLE, key).with("first_name", name)
        }),
        1 => key_strategy().prop_map(|key| Operation::delete(PERSON_TABLE, key)),
        3 => (key_strategy(), key_strategy()).prop_map(|(key, person)| {
            Operation::insert(PERSON_EVENT_TABLE, key)
                .with("person_id", person)
                .with("event", "CREATED")
        }),
        1 => key_strategy().prop_map(|key| Operation::delete(PERSON_EVENT_TABLE, key)),
    ]
    .boxed()
}

fn document_operation() -> BoxedStrategy<Operation> {
    let collection = prop::sample::select(vec![PERSON_COLLECTION, PERSON_EVENT_COLLECTION]);
    prop_oneof![
        3 => (collection.clone(), key_strategy(), name_strategy()).prop_map(
            |(collection, key, name)| Operation::insert(collection, key).with("firstName", name)
        ),
        1 => (collection.clone(), key_strategy(), name_strategy()).prop_map(
            |(collection, key, name)| Operation::update(collection, key).with("firstName", name)
        ),
        1 => (collection, key_strategy())
            .prop_map(|(collection, key)| Operation::delete(collection, key)),
    ]
    .boxed()
}

fn graph_operation() -> BoxedStrategy<Operation> {
    prop_oneof![
        3 => (key_strategy(), name_strategy())
            .prop_map(|(key, name)| Operation::insert(PERSON_LABEL, key).with("name", name)),
        2 => key_strategy()
            .prop_map(|key| Operation::insert(MOVIE_LABEL, key).with("title", "El Camino")),
        2 => (key_strategy(), key_strategy(), key_strategy()).prop_map(|(key, from, to)| {
            Operation::insert(ACTED_IN, key).with(FROM, from).with(TO, to)
        }),
        1 => key_strategy().prop_map(|key| Operation::delete(PERSON_LABEL, key)),
        1 => key_strategy().prop_map(|key| Operation::delete(ACTED_IN, key)),
    ]
    .boxed()
}

/// Strategy for a single operation against `backend`'s schema.
pub fn operation_strategy(backend: Backend) -> BoxedStrategy<Operation> {
    match backend {
        Backend::Relational => relational_operation(),
        Backend::Document => document_operation(),
        Backend::Graph => graph_operation(),
    }
}

/// Strategy for a unit of work of 1 to 7 operations.
pub fn unit_strategy(backend: Backend) -> impl Strategy<Value = Vec<Operation>> {
    prop::collection::vec(operation_strategy(backend), 1..8)
}

/// Strategy for a backend paired with a unit of work against it.
pub fn backend_unit_strategy() -> impl Strategy<Value = (Backend, Vec<Operation>)> {
    prop::sample::select(Backend::ALL.to_vec())
        .prop_flat_map(|backend| (Just(backend), unit_strategy(backend)))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
