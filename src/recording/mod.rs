mod controller;
mod worker;

pub use controller::{RecordingController, RecordingSettings};
pub use worker::{RecordingWorker, StorageQueue};
