pub mod bm25;
pub mod context;
pub mod fusion;
pub mod hybrid;
pub mod multi_pass;
pub mod pipeline;
pub mod vector;
