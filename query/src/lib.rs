pub mod engine;
pub mod ontology;
pub mod request;
pub mod search;

pub use engine::{OrchestrationError, QueryError, QueryOrchestrator};
pub use ontology::{IndexedOntologyLookup, OntologyError, OntologyLookup};
pub use request::{NetworkSource, QueryRequest, RawQueryParameters, RequestValidator, ValidationError};
pub use search::{PathFinder, PathQuery, PathSet, PathStep, RankedPath, RankedPathFinder, SearchError};
