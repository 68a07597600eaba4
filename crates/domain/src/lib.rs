pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod run;
pub mod scope;
pub mod stream;
pub mod trace;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{Event, RunInput};
pub use message::{FunctionCall, Message, Role, ToolCallRequest};
pub use run::{Run, ThreadMetadata, ThreadRecord};
pub use scope::{parse_client_hint, ClientHint, ResourceScope};
pub use stream::EventStream;
pub use trace::TraceEvent;
