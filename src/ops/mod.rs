pub mod composite;
pub mod mask;
pub mod transform;
