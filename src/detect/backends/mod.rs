pub mod local;
pub mod remote;
pub mod stub;

pub use local::LocalClassifier;
pub use remote::{RemoteClassifier, RemoteConfig};
pub use stub::{StubClassifier, StubOutcome};
