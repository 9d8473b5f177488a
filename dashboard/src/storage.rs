//! Avatar objects kept on the local filesystem and served under `/storage`.

use std::path::{Component, Path, PathBuf};

use platform_api::{ApiError, ApiResult};
use sea_orm::DatabaseConnection;
use tokio::fs;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::users::{UserView, replace_avatar_url};

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;
const AVATAR_PREFIX: &str = "avatars";

/// Accepted image types and the extension stored objects get.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct AvatarStore {
    root: PathBuf,
    public_base: String,
}

impl AvatarStore {
    /// `root` is the bucket directory; `public_base` is the URL it is served
    /// from, e.g. `http://localhost:8080/storage`.
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    /// Object key for a URL this store handed out. Foreign URLs and keys that
    /// would escape the bucket yield `None`.
    pub fn key_of(&self, url: &str) -> Option<String> {
        let key = url.strip_prefix(&self.public_base)?.trim_start_matches('/');
        let path = Path::new(key);
        let clean = !key.is_empty()
            && path
                .components()
                .all(|part| matches!(part, Component::Normal(_)));
        clean.then(|| key.to_string())
    }

    async fn write_object(&self, key: &str, bytes: &[u8]) -> ApiResult<()> {
        let path = self.root.join(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(ApiError::internal)?;
        }
        fs::write(&path, bytes).await.map_err(ApiError::internal)
    }

    /// Remove a previously stored object. A missing file is not an error.
    async fn remove_url(&self, url: &str) {
        let Some(key) = self.key_of(url) else {
            return;
        };
        match fs::remove_file(self.root.join(&key)).await {
            Ok(()) => info!(%key, "avatar object removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(%key, error = %err, "failed to remove avatar object"),
        }
    }
}

fn ensure_owner_or_admin(caller: &CurrentUser, target: Uuid) -> ApiResult<()> {
    if caller.user_id == target || caller.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("you can only change your own avatar"))
    }
}

/// Store a new avatar for `target`, point the profile at it and drop the
/// object it replaces.
#[instrument(skip(db, store, caller, bytes), fields(caller = %caller.user_id, size = bytes.len()))]
pub async fn upload_avatar(
    db: &DatabaseConnection,
    store: &AvatarStore,
    caller: &CurrentUser,
    target: Uuid,
    content_type: &str,
    bytes: &[u8],
) -> ApiResult<UserView> {
    ensure_owner_or_admin(caller, target)?;
    let ext = extension_for(content_type)
        .ok_or_else(|| ApiError::invalid("avatar must be a PNG, JPEG, WebP or GIF image"))?;
    if bytes.is_empty() {
        return Err(ApiError::invalid("avatar image is empty"));
    }
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::invalid("avatar image is larger than 2 MiB"));
    }

    let key = format!("{AVATAR_PREFIX}/{target}/{}.{ext}", Uuid::new_v4());
    store.write_object(&key, bytes).await?;
    let (previous, view) = match replace_avatar_url(db, target, Some(store.public_url(&key))).await
    {
        Ok(done) => done,
        Err(err) => {
            store.remove_url(&store.public_url(&key)).await;
            return Err(err);
        }
    };
    if let Some(old) = previous {
        store.remove_url(&old).await;
    }
    info!(%target, %key, "avatar uploaded");
    Ok(view)
}

#[instrument(skip(db, store, caller), fields(caller = %caller.user_id))]
pub async fn remove_avatar(
    db: &DatabaseConnection,
    store: &AvatarStore,
    caller: &CurrentUser,
    target: Uuid,
) -> ApiResult<UserView> {
    ensure_owner_or_admin(caller, target)?;
    let (previous, view) = replace_avatar_url(db, target, None).await?;
    if let Some(old) = previous {
        store.remove_url(&old).await;
    }
    info!(%target, "avatar removed");
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AvatarStore {
        AvatarStore::new("/tmp/bucket", "http://localhost:8080/storage/")
    }

    #[test]
    fn content_types_map_to_extensions() {
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("IMAGE/JPEG; charset=binary"), Some("jpg"));
        assert_eq!(extension_for("image/svg+xml"), None);
        assert_eq!(extension_for(""), None);
    }

    #[test]
    fn keys_round_trip_through_public_urls() {
        let store = store();
        let url = store.public_url("avatars/a/b.png");
        assert_eq!(url, "http://localhost:8080/storage/avatars/a/b.png");
        assert_eq!(store.key_of(&url).as_deref(), Some("avatars/a/b.png"));
    }

    #[test]
    fn foreign_and_traversing_urls_have_no_key() {
        let store = store();
        assert_eq!(store.key_of("https://cdn.example.com/avatars/x.png"), None);
        assert_eq!(
            store.key_of("http://localhost:8080/storage/../etc/passwd"),
            None
        );
        assert_eq!(store.key_of("http://localhost:8080/storage/"), None);
    }
}
