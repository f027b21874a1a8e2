//! Image assets in an external blob store.
//!
//! Assets live under `app/{app}/flow/{flow}/step/{step}/{file}`. The store
//! itself is a collaborator behind [`AssetStore`]; this module owns the path
//! convention, unique file names, and the delete flow that only clears a
//! widget's image once the store confirms.

use std::fmt;
use std::future::Future;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use url::Url;
use uuid::Uuid;

use crate::error::AssetError;
use crate::properties::WidgetBody;
use crate::response::StepId;

/// Where a step lives, for asset paths.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepLocation {
    pub app: SmolStr,
    pub flow: SmolStr,
    pub step: StepId,
}

impl StepLocation {
    pub fn new(app: &str, flow: &str, step: &str) -> Self {
        Self {
            app: app.into(),
            flow: flow.into(),
            step: step.into(),
        }
    }

    /// `app/{app}/flow/{flow}/step/{step}`
    pub fn step_prefix(&self) -> String {
        format!("app/{}/flow/{}/step/{}", self.app, self.flow, self.step)
    }

    /// `app/{app}/flow`, the root of everything the app owns.
    pub fn app_prefix(&self) -> String {
        app_prefix(&self.app)
    }
}

fn app_prefix(app: &str) -> String {
    format!("app/{app}/flow")
}

/// Object path inside the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(String);

impl AssetPath {
    /// Path for a new upload of `file_name` into `location`, made unique so
    /// re-uploading the same file never overwrites an earlier one.
    pub fn for_upload(location: &StepLocation, file_name: &str) -> Result<Self, AssetError> {
        Ok(Self(format!(
            "{}/{}",
            location.step_prefix(),
            unique_file_name(file_name)?
        )))
    }

    pub fn from_raw(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `photo.png` becomes `photo-3fa.png`.
pub fn unique_file_name(file_name: &str) -> Result<String, AssetError> {
    let (stem, ext) = file_name
        .rsplit_once('.')
        .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
        .ok_or_else(|| AssetError::MissingExtension(file_name.to_owned()))?;
    let suffix = Uuid::new_v4().simple().to_string();
    Ok(format!("{stem}-{}.{ext}", &suffix[..3]))
}

/// Recover the object path from a download URL.
///
/// Download URLs carry the percent-encoded path after `/o/`, e.g.
/// `https://host/v0/b/bucket/o/app%2Fa%2F...%2Fphoto.png?alt=media`.
pub fn storage_path_from_url(url: &str) -> Result<AssetPath, AssetError> {
    let parsed = Url::parse(url).map_err(|_| AssetError::NotAStorageUrl(url.to_owned()))?;
    let path = parsed.path();
    let start = path
        .find("/o/")
        .ok_or_else(|| AssetError::NotAStorageUrl(url.to_owned()))?;
    let decoded = percent_decode_str(&path[start + 3..])
        .decode_utf8()
        .map_err(|_| AssetError::NotAStorageUrl(url.to_owned()))?;
    Ok(AssetPath(decoded.into_owned()))
}

/// The blob store holding uploaded images.
pub trait AssetStore {
    /// Store `bytes` at `path`, returning the public download URL.
    fn upload(
        &self,
        path: &AssetPath,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<String, AssetError>>;

    fn delete(&self, path: &AssetPath) -> impl Future<Output = Result<(), AssetError>>;

    /// Download URLs of every object below `prefix`.
    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<String>, AssetError>>;
}

/// User-visible notices.
pub trait Alerts {
    fn alert(&self, message: &str);
}

/// Upload an image chosen for `location` and return its URL.
pub async fn upload_image(
    store: &impl AssetStore,
    location: &StepLocation,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<String, AssetError> {
    let path = AssetPath::for_upload(location, file_name)?;
    tracing::debug!(%path, size = bytes.len(), "uploading image");
    store.upload(&path, bytes).await
}

/// Delete the image a widget shows.
///
/// Returns the body with its `url` cleared once the store confirms. On
/// failure the user is alerted and the caller keeps the old body.
pub async fn delete_image(
    store: &impl AssetStore,
    body: &WidgetBody,
    alerts: &impl Alerts,
) -> Result<WidgetBody, AssetError> {
    let result = async {
        let url = body
            .url
            .as_deref()
            .ok_or_else(|| AssetError::NotAStorageUrl(String::new()))?;
        let path = storage_path_from_url(url)?;
        store.delete(&path).await
    }
    .await;

    match result {
        Ok(()) => Ok(WidgetBody {
            url: None,
            ..body.clone()
        }),
        Err(error) => {
            tracing::warn!(%error, "image delete failed");
            alerts.alert("Failed to delete the image.");
            Err(error)
        }
    }
}

/// Every image uploaded anywhere in `app`, for the asset library.
///
/// Only objects directly inside a step folder count.
pub async fn list_app_assets(store: &impl AssetStore, app: &str) -> Result<Vec<String>, AssetError> {
    let urls = store.list(&app_prefix(app)).await?;
    Ok(urls
        .into_iter()
        .filter(|url| {
            storage_path_from_url(url).is_ok_and(|path| is_step_asset(path.as_str(), app))
        })
        .collect())
}

fn is_step_asset(path: &str, app: &str) -> bool {
    let segments: Vec<&str> = path.split('/').collect();
    matches!(
        segments.as_slice(),
        ["app", a, "flow", flow, "step", step, file]
            if *a == app && !flow.is_empty() && !step.is_empty() && !file.is_empty()
    )
}
