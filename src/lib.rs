pub mod crd;
pub mod desired;
pub mod operator;
pub mod reconciler;
pub mod router;
pub mod store;
pub mod types;

pub use crd::{Server, ServerSpec};
pub use desired::{build_deployment, DesiredState, ServerDeployment};
pub use kubetorio_core::{
    Error, ObjectKey, OperatorConfig, Outcome, OwnerMatch, OwnershipIndex, Result,
};
pub use operator::Operator;
pub use reconciler::{Dependent, Parent, Reconciler};
pub use store::{KubeStore, MemoryStore, ObjectStore};
