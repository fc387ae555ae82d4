//! Session orchestration: the shared session set, the pollers that keep it
//! converged with the providers, background removals, the start and resume
//! workflows and the terminal hand-off loop.

pub mod handoff;
pub mod pr_cache;
pub mod reconcile;
pub mod store;
pub mod tasks;
pub mod workflow;

pub use handoff::{run_controller, ChildRunner, HandoffResult, NextView, ProcessRunner, UiLoop};
pub use pr_cache::{PrCache, PR_CACHE_TTL};
pub use reconcile::{
    spawn_detail_poller, spawn_list_poller, spawn_stats_poller, PollEvent, PollerHandle,
};
pub use store::SessionStore;
pub use tasks::{TaskEvent, TaskQueue};
pub use workflow::{
    AgentLogin, AuthResume, Collaborators, Pending, ResumeRequest, StartOutcome, StartRequest,
    Workflow, WorkflowError, WorkflowStep,
};
