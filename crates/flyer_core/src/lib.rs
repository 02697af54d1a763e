pub mod audit;
pub mod completion;
pub mod domain;
pub mod error;
pub mod flyers;
pub mod format;
pub mod layout;
pub mod permissions;
pub mod placement;
pub mod ports;
pub mod render;
pub mod view;
pub mod workflow;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use domain::{
    Approval, ApprovalWorkflow, EditHistoryEntry, Flyer, FlyerStatus, Page, PromoSize, Role, Slot,
    SlotContent, User,
};
pub use error::{CoreError, CoreResult};
pub use flyers::{FlyerPatch, FlyerService, NewFlyer};
pub use placement::{PlacementPolicy, PlacementService};
pub use ports::{Collaborators, PortError, PortResult};
pub use workflow::{Verdict, WorkflowPolicy, WorkflowService, WorkflowStatus};
