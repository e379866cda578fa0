pub mod actuate;
pub mod classify;
pub mod config;
pub mod dom;
pub mod errors;
pub mod evidence;
pub mod flows;
pub mod resolve;
pub mod session;
pub mod signatures;
pub mod testdata;
pub mod testing;

pub use classify::{classify, PageState};
pub use config::FlowConfig;
pub use errors::{FlowError, Result};
pub use evidence::Evidence;
pub use flows::{
    CartFlow, Credentials, FlowReport, FlowVerdict, LoginFlow, RunContext, SearchFlow,
};
pub use resolve::{resolve, Candidate, Goal, ResolutionQuery};
pub use session::{ChromeDriver, Driver, TabTracker};
