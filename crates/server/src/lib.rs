pub mod error;
pub mod extractors;
pub mod routes;

pub type DeploymentImpl = local_deployment::LocalDeployment;
