//! Graph data model: nodes, edges, and batches
//!
//! Everything the probe observes is expressed as one of three node kinds
//! (domain, IP, certificate) plus typed edges between them. Batches are the
//! unit of delivery to the ingest sink and serialize with bit-exact field
//! names expected by the downstream schema.

mod types;

pub use types::{Batch, CertNode, Contribution, DomainNode, Edge, EdgeKind, IpNode};
