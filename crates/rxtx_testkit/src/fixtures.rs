//! Demonstration schemas and scenarios.
//!
//! Every backend kind gets a person / person event model and the same
//! three-step story: write a record, write a record that depends on it,
//! remove the first record, then attempt a write the constraints reject.

use rxtx_core::{
    AsyncTransactionCoordinator, CancellationToken, CoordError, CoordResult, Outcome,
    TransactionCoordinator, TransactionMode,
};
use rxtx_resource::{
    AsyncResourceProvider, Dataset, DocumentSchema, DocumentStore, FaultPoint, GraphSchema,
    GraphStore, Operation, OperationResult, Record, RelationalSchema, RelationalStore,
    ResourceError, StoreStats, TableDef, FROM, TO,
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Relational person table.
pub const PERSON_TABLE: &str = "person";
/// Relational person event table.
pub const PERSON_EVENT_TABLE: &str = "person_event";
/// Document person collection.
pub const PERSON_COLLECTION: &str = "person";
/// Document person event collection.
pub const PERSON_EVENT_COLLECTION: &str = "personEvent";
/// Graph person label.
pub const PERSON_LABEL: &str = "Person";
/// Graph movie label.
pub const MOVIE_LABEL: &str = "Movie";
/// Graph relationship type between people and movies.
pub const ACTED_IN: &str = "ACTED_IN";

/// Backend kinds available to tests and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Tables with foreign keys.
    Relational,
    /// Collections with `_id`.
    Document,
    /// Labelled nodes and relationships.
    Graph,
}

impl Backend {
    /// All backends.
    pub const ALL: [Backend; 3] = [Backend::Relational, Backend::Document, Backend::Graph];

    /// Creates a fresh store with the demonstration schema.
    pub fn store(self) -> AnyStore {
        match self {
            Self::Relational => AnyStore::Relational(RelationalStore::new(relational_schema())),
            Self::Document => AnyStore::Document(DocumentStore::new(document_schema())),
            Self::Graph => AnyStore::Graph(GraphStore::new(graph_schema())),
        }
    }

    /// Returns the demonstration scenario.
    pub fn scenario(self) -> Scenario {
        match self {
            Self::Relational => relational_scenario(),
            Self::Document => document_scenario(),
            Self::Graph => graph_scenario(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Relational => "relational",
            Self::Document => "document",
            Self::Graph => "graph",
        };
        f.write_str(name)
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relational" => Ok(Self::Relational),
            "document" => Ok(Self::Document),
            "graph" => Ok(Self::Graph),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// `person` and `person_event(person_id -> person)`.
pub fn relational_schema() -> RelationalSchema {
    RelationalSchema::new()
        .with_table(TableDef::new(PERSON_TABLE))
        .with_table(TableDef::new(PERSON_EVENT_TABLE).foreign_key("person_id", PERSON_TABLE))
}

/// `person` and `personEvent`, `_id` indexes only.
pub fn document_schema() -> DocumentSchema {
    DocumentSchema::new()
}

/// Unique `Person.name`, `ACTED_IN` from `Person` to `Movie`.
pub fn graph_schema() -> GraphSchema {
    GraphSchema::new()
        .unique(PERSON_LABEL, "name")
        .relationship(ACTED_IN, PERSON_LABEL, MOVIE_LABEL)
}

/// A record addressed by target and key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef {
    /// Table, collection or label.
    pub target: &'static str,
    /// Primary key, `_id` or node id.
    pub key: i64,
}

impl RecordRef {
    /// Creates a record reference.
    pub const fn new(target: &'static str, key: i64) -> Self {
        Self { target, key }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.target, self.key)
    }
}

/// Operations and expectations of one backend's demonstration.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Backend the operations are written for.
    pub backend: Backend,
    /// Record A.
    pub parent: RecordRef,
    /// Record B, written while A exists.
    ///
    /// On the graph backend B is a node that does not reference A: a node
    /// with relationships cannot be deleted, so the step that removes A
    /// would fail early.
    pub dependent: RecordRef,
    /// Write A, write B, delete A, then a write that must fail.
    pub dependent_failure: Vec<Operation>,
    /// Two dependent writes, the last one violating uniqueness.
    pub unique_violation: Vec<Operation>,
}

impl Scenario {
    /// Index of the step in `dependent_failure` that is rejected.
    pub fn failing_step(&self) -> usize {
        self.dependent_failure.len() - 1
    }

    /// Steps that create A and B.
    pub fn seed(&self) -> &[Operation] {
        &self.dependent_failure[..2]
    }

    /// Steps after the seed: delete A, then the rejected write.
    pub fn after_seed(&self) -> &[Operation] {
        &self.dependent_failure[2..]
    }

    /// The rejected write.
    pub fn rejected(&self) -> &Operation {
        &self.dependent_failure[self.failing_step()]
    }
}

fn relational_scenario() -> Scenario {
    let jesse = || {
        Operation::insert(PERSON_TABLE, 1)
            .with("first_name", "Jesse")
            .with("last_name", "Pinkman")
    };
    let event = |id: i64, kind: &str| {
        Operation::insert(PERSON_EVENT_TABLE, id)
            .with("person_id", 1)
            .with("first_name", "Jesse")
            .with("last_name", "Pinkman")
            .with("event", kind)
    };
    Scenario {
        backend: Backend::Relational,
        parent: RecordRef::new(PERSON_TABLE, 1),
        dependent: RecordRef::new(PERSON_EVENT_TABLE, 1),
        dependent_failure: vec![
            jesse(),
            event(1, "CREATED"),
            Operation::delete(PERSON_TABLE, 1),
            event(2, "DELETED"),
        ],
        unique_violation: vec![jesse(), event(1, "CREATED"), event(1, "UPDATED")],
    }
}

fn document_scenario() -> Scenario {
    let jesse = || {
        Operation::insert(PERSON_COLLECTION, 1)
            .with("firstName", "Jesse")
            .with("lastName", "Pinkman")
    };
    let event = |kind: &str| {
        Operation::insert(PERSON_EVENT_COLLECTION, 1)
            .with("personId", 1)
            .with("firstName", "Jesse")
            .with("lastName", "Pinkman")
            .with("event", kind)
    };
    Scenario {
        backend: Backend::Document,
        parent: RecordRef::new(PERSON_COLLECTION, 1),
        dependent: RecordRef::new(PERSON_EVENT_COLLECTION, 1),
        dependent_failure: vec![
            jesse(),
            event("CREATED"),
            Operation::delete(PERSON_COLLECTION, 1),
            event("DELETED"),
        ],
        unique_violation: vec![jesse(), event("CREATED"), event("UPDATED")],
    }
}

/// The rejected write is the `ACTED_IN` relationship to the deleted person.
fn graph_scenario() -> Scenario {
    let aaron = |id: i64| Operation::insert(PERSON_LABEL, id).with("name", "Aaron Paul");
    let movie = || Operation::insert(MOVIE_LABEL, 10).with("title", "El Camino");
    Scenario {
        backend: Backend::Graph,
        parent: RecordRef::new(PERSON_LABEL, 1),
        dependent: RecordRef::new(MOVIE_LABEL, 10),
        dependent_failure: vec![
            aaron(1),
            movie(),
            Operation::delete(PERSON_LABEL, 1),
            Operation::insert(ACTED_IN, 100)
                .with(FROM, 1)
                .with(TO, 10)
                .with("roles", "Jesse Pinkman"),
        ],
        unique_violation: vec![aaron(1), movie(), aaron(2)],
    }
}

/// A store of any backend kind.
#[derive(Debug, Clone)]
pub enum AnyStore {
    /// Relational backend.
    Relational(RelationalStore),
    /// Document backend.
    Document(DocumentStore),
    /// Graph backend.
    Graph(GraphStore),
}

macro_rules! dispatch {
    ($store:expr, $inner:ident => $body:expr) => {
        match $store {
            AnyStore::Relational($inner) => $body,
            AnyStore::Document($inner) => $body,
            AnyStore::Graph($inner) => $body,
        }
    };
}

impl AnyStore {
    /// Returns the backend kind.
    pub fn backend(&self) -> Backend {
        match self {
            Self::Relational(_) => Backend::Relational,
            Self::Document(_) => Backend::Document,
            Self::Graph(_) => Backend::Graph,
        }
    }

    /// Returns a copy of the committed data.
    pub fn snapshot(&self) -> Dataset {
        dispatch!(self, store => store.snapshot())
    }

    /// Returns true if the committed data holds `record`.
    pub fn contains(&self, record: RecordRef) -> bool {
        dispatch!(self, store => store.contains(record.target, record.key))
    }

    /// Returns a committed record.
    pub fn get(&self, record: RecordRef) -> Option<Record> {
        dispatch!(self, store => store.get(record.target, record.key))
    }

    /// Number of committed records in `target`.
    pub fn count(&self, target: &str) -> usize {
        dispatch!(self, store => store.count(target))
    }

    /// Returns true if `operation`'s effect is what the store holds.
    ///
    /// An insert or update is held when its record exists with exactly the
    /// written fields; a delete is held when the record is gone.
    pub fn holds(&self, operation: &Operation) -> bool {
        let key = operation.key().clone();
        let stored = dispatch!(self, store => store.get(operation.target(), key));
        match (operation.fields(), stored) {
            (Some(fields), Some(stored)) => fields.iter().all(|(k, v)| stored.get(k) == Some(v)),
            (Some(_), None) => false,
            (None, stored) => stored.is_none(),
        }
    }

    /// Returns handle and transaction counters.
    pub fn stats(&self) -> StoreStats {
        dispatch!(self, store => store.stats())
    }

    /// Arms a one-shot fault.
    pub fn fail_next(&self, point: FaultPoint, error: ResourceError) {
        dispatch!(self, store => store.fail_next(point, error));
    }

    /// Runs `operations` in `mode` with a blocking coordinator.
    pub fn run(
        &self,
        coordinator: &TransactionCoordinator,
        mode: TransactionMode,
        operations: &[Operation],
    ) -> Outcome<Vec<OperationResult>> {
        dispatch!(self, store => coordinator.run_in(mode, store, operations))
    }

    /// Runs `operations` in `mode` with an async coordinator.
    ///
    /// Every store round trip takes `latency`.
    pub async fn run_async(
        &self,
        coordinator: &AsyncTransactionCoordinator,
        mode: TransactionMode,
        operations: &[Operation],
        latency: Duration,
        token: &CancellationToken,
    ) -> Outcome<Vec<OperationResult>> {
        dispatch!(self, store => {
            let provider = store.asynchronous(latency);
            run_async_in(coordinator, mode, &provider, operations, token).await
        })
    }
}

async fn run_async_in<P: AsyncResourceProvider>(
    coordinator: &AsyncTransactionCoordinator,
    mode: TransactionMode,
    provider: &P,
    operations: &[Operation],
    token: &CancellationToken,
) -> Outcome<Vec<OperationResult>> {
    match mode {
        TransactionMode::AutoCommit => {
            coordinator
                .run_auto_commit_cancellable(provider, operations, token)
                .await
        }
        TransactionMode::Explicit => {
            coordinator
                .run_explicit_cancellable(provider, operations, token)
                .await
        }
        TransactionMode::Declarative => {
            coordinator
                .run_declarative_cancellable(provider, token, |txn| async move {
                    let mut results = Vec::with_capacity(operations.len());
                    for operation in operations {
                        results.push(txn.execute(operation).await?);
                    }
                    CoordResult::Ok(results)
                })
                .await
        }
    }
}

/// Renders the committed rows of every target, one line per record.
pub fn render_rows(data: &Dataset) -> String {
    let mut out = String::new();
    for (target, table) in data.targets() {
        out.push_str(&format!("Rows in {target}\n"));
        for (key, record) in table {
            let fields: Vec<String> = record.iter().map(|(k, v)| format!("{k}={v}")).collect();
            out.push_str(&format!("  {key}: {}\n", fields.join(", ")));
        }
    }
    out
}

/// Unit error used by tests that fail on purpose.
pub fn business_error() -> CoordError {
    CoordError::unit_failed("Throwing a business error")
}
