pub mod allocation;
pub mod contract;
