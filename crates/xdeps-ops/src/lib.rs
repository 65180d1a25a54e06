pub mod ops_list;
pub mod ops_resolve;
pub mod ops_target;
