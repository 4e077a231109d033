pub mod subset;

pub use subset::handle_subset;
