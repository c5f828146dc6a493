pub mod match_ids;
pub mod sort;
