//! Storage key constants.

/// Storage keys used by the client
pub struct StorageKeys;

impl StorageKeys {
    /// Session persisted across restarts ("remember me"), durable store
    pub const REMEMBERED_USER: &'static str = "rememberedUser";

    /// Session scoped to the current process, ephemeral store
    pub const SESSION_USER: &'static str = "sessionUser";
}
