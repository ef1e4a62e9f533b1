pub mod config;
pub mod controller;
pub mod machine;
pub mod reporter;
pub mod store;
pub mod surface;

pub use config::{CarConfig, ChannelConfig, Config, StoreConfig, TcpRole};
pub use controller::{ControllerError, Selection, SelectionOutcome, StatusController, StatusHandle};
pub use machine::{Completion, Confirmation, Phase, StatusMachine, StatusSnapshot, Ticket};
pub use reporter::http::HttpStatusReporter;
pub use reporter::mock::{MockOutcome, MockReporter};
pub use reporter::{ReportError, StatusReporter, status_url};
pub use store::memory::{MemoryStore, MemoryStoreError};
pub use store::sqlite::{SqliteStore, SqliteStoreError};
pub use store::{DEFAULT_NAMESPACE, StatusStore, StoreKey, StoreValue};
pub use surface::{Header, StatusSurface, SurfaceView, Tile};
