// Katara: synthesizes replicated datatype (CRDT) designs from sequential
// reference implementations lifted into a typed expression algebra

pub mod aci;
pub mod analysis;
pub mod auto_grammar;
pub mod grammars;
pub mod ir;
pub mod lattices;
pub mod process_tracker;
pub mod report;
pub mod search_structures;
pub mod smt;
pub mod synthesis;
