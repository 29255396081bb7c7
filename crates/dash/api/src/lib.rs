pub mod function;
pub mod model_storage_binding;
pub mod model_user;

pub mod consts {
    pub const NAMESPACE: &str = "dash";
}
