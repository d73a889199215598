#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

//! GraphRAG retrieval over the knowledge graph: community-anchored claim
//! retrieval with MMR diversity selection, shortest-path evidence
//! subgraphs, and the intent-dispatched plan family.

pub mod community_index;
pub mod engine;
pub mod mmr;
pub mod paths;
pub mod plans;
pub mod subgraph;
pub mod views;

pub use engine::{
    retrieve_context, retrieve_context_with_embedding, ContextBundle, GraphRagParams,
};
pub use plans::{run_plan, DetailLevel, Intent, PlanOptions, PlanServices, RetrievalResult};
pub use subgraph::{get_evidence_subgraph, EvidenceSubgraph};
