mod blob_storage;
mod filesystem;
mod register;

pub use register::BackendConfigs;
