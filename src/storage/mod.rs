// Storage module: columnar persistence for listing datasets.

pub mod csv_store;

pub use csv_store::CsvStore;
