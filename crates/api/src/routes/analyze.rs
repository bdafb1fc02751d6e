//! Analysis routes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::Json;
use rds_engine::{
    default_annotated_path, Observation, Summary, VideoAnalysisRequest, DEFAULT_CONFIDENCE,
    DEFAULT_SKIP_FRAMES,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Query parameters for `POST /analyze/video`
#[derive(Debug, Deserialize)]
pub struct VideoQuery {
    #[serde(default = "default_skip_frames")]
    pub skip_frames: u64,
    /// Inference size hint; the deployed models fix the actual size
    #[serde(default = "default_imgsz")]
    pub imgsz: u32,
    #[serde(default = "default_conf")]
    pub conf: f32,
    pub max_frames: Option<u64>,
    #[serde(default)]
    pub save_annotated: bool,
}

fn default_skip_frames() -> u64 {
    DEFAULT_SKIP_FRAMES
}

fn default_imgsz() -> u32 {
    640
}

fn default_conf() -> f32 {
    DEFAULT_CONFIDENCE
}

fn default_true() -> bool {
    true
}

impl VideoQuery {
    fn validate(&self) -> ApiResult<()> {
        if self.skip_frames < 1 {
            return Err(ApiError::Validation("skip_frames must be at least 1".into()));
        }
        if self.imgsz < 1 {
            return Err(ApiError::Validation("imgsz must be at least 1".into()));
        }
        if self.max_frames == Some(0) {
            return Err(ApiError::Validation("max_frames must be at least 1".into()));
        }
        validate_conf(self.conf)
    }
}

/// Query parameters for `POST /analyze/image`
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(default = "default_conf")]
    pub conf: f32,
    #[serde(default = "default_true")]
    pub save_annotated: bool,
}

fn validate_conf(conf: f32) -> ApiResult<()> {
    if (0.0..=1.0).contains(&conf) {
        Ok(())
    } else {
        Err(ApiError::Validation("conf must be within [0, 1]".into()))
    }
}

/// Summary with non-finite values reported as `null`
#[derive(Debug, Serialize, PartialEq)]
pub struct SummaryBody {
    pub avg_potholes: Option<f64>,
    pub avg_rough: Option<f64>,
    pub avg_lanes: Option<f64>,
    pub avg_signs: Option<f64>,
    #[serde(rename = "avg_RDS")]
    pub avg_rds: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl From<&Summary> for SummaryBody {
    fn from(summary: &Summary) -> Self {
        Self {
            avg_potholes: finite(summary.avg_potholes),
            avg_rough: finite(summary.avg_rough),
            avg_lanes: finite(summary.avg_lanes),
            avg_signs: finite(summary.avg_signs),
            avg_rds: finite(summary.avg_rds),
        }
    }
}

/// Paths are `/outputs/...` URLs served by this router
#[derive(Debug, Serialize)]
pub struct VideoResponse {
    pub summary: SummaryBody,
    pub output_video: Option<String>,
    pub input_path: String,
    /// Frames sampled; 0 means nothing was analysed
    pub frames: usize,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    #[serde(flatten)]
    pub observation: Observation,
    pub annotated_path: Option<String>,
}

/// Public URL of a file stored directly in the output directory
fn output_url(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/outputs/{}", name)
}

/// Annotated video file name; a container when this build can encode one
fn annotated_video_name(id: Uuid) -> String {
    let ext = if video_io::CONTAINER_SUPPORT { "mp4" } else { "gif" };
    format!("{}_annotated.{}", id, ext)
}

struct Upload {
    extension: String,
    data: Vec<u8>,
}

/// Extension of the uploaded file name, restricted to a safe alphabet
fn upload_extension(file_name: Option<&str>, fallback: &str) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| fallback.to_string())
}

async fn read_upload(mut multipart: Multipart, fallback_extension: &str) -> ApiResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let extension = upload_extension(field.file_name(), fallback_extension);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        return Ok(Upload {
            extension,
            data: data.to_vec(),
        });
    }
    Err(ApiError::BadRequest("Missing required 'file' field".into()))
}

async fn store_upload(output_dir: &Path, id: Uuid, upload: &Upload) -> ApiResult<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let path = output_dir.join(format!("{}.{}", id, upload.extension));
    tokio::fs::write(&path, &upload.data)
        .await
        .map_err(|e| ApiError::Internal(format!("{}: {}", path.display(), e)))?;
    Ok(path)
}

/// Analyse an uploaded road video
pub async fn analyze_video(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VideoQuery>,
    multipart: Multipart,
) -> ApiResult<Json<VideoResponse>> {
    params.validate()?;
    let upload = read_upload(multipart, "mp4").await?;

    let id = Uuid::new_v4();
    let input_path = store_upload(&state.output_dir, id, &upload).await?;
    let output_path = params
        .save_annotated
        .then(|| state.output_dir.join(annotated_video_name(id)));
    info!(
        "Video upload {} ({} bytes, imgsz hint {})",
        input_path.display(),
        upload.data.len(),
        params.imgsz
    );

    let request = VideoAnalysisRequest::new(&input_path)
        .with_skip_frames(params.skip_frames)
        .with_confidence(params.conf)
        .with_max_frames(params.max_frames)
        .with_output(output_path);

    let engine = Arc::clone(&state.engine);
    let report = tokio::task::spawn_blocking(move || engine.analyze_video(&request))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(VideoResponse {
        summary: SummaryBody::from(&report.summary),
        output_video: report.output_path.as_deref().map(output_url),
        input_path: output_url(&input_path),
        frames: report.frames_sampled,
    }))
}

/// Count road features in an uploaded still image
pub async fn analyze_image(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ImageQuery>,
    multipart: Multipart,
) -> ApiResult<Json<ImageResponse>> {
    validate_conf(params.conf)?;
    let upload = read_upload(multipart, "jpg").await?;

    let input_path = store_upload(&state.output_dir, Uuid::new_v4(), &upload).await?;
    let annotated_path = params
        .save_annotated
        .then(|| default_annotated_path(&input_path));

    let engine = Arc::clone(&state.engine);
    let report = tokio::task::spawn_blocking(move || {
        engine.analyze_image(&input_path, params.conf, annotated_path.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(ImageResponse {
        observation: report.observation,
        annotated_path: report.annotated_path.as_deref().map(output_url),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension(Some("drive.MOV"), "mp4"), "mov");
        assert_eq!(upload_extension(Some("drive"), "mp4"), "mp4");
        assert_eq!(upload_extension(Some("../../etc/x.p/hp"), "mp4"), "mp4");
        assert_eq!(upload_extension(Some("frame.p%g"), "jpg"), "jpg");
        assert_eq!(upload_extension(None, "jpg"), "jpg");
    }

    #[test]
    fn test_output_url_uses_file_name() {
        assert_eq!(output_url(Path::new("/srv/rds/outputs/abc.mp4")), "/outputs/abc.mp4");
        assert_eq!(output_url(Path::new("outputs/abc_annotated.gif")), "/outputs/abc_annotated.gif");
    }

    #[test]
    fn test_non_finite_summary_values_become_null() {
        let mut summary = Summary::from_averages(1.0, 0.0, 0.0, 0.0);
        summary.avg_lanes = f64::NAN;
        let body = SummaryBody::from(&summary);
        assert_eq!(body.avg_potholes, Some(1.0));
        assert_eq!(body.avg_lanes, None);

        let json = serde_json::to_value(&body).unwrap();
        assert!(json["avg_lanes"].is_null());
        assert!(json.get("avg_RDS").is_some());
    }

    #[test]
    fn test_video_query_validation() {
        let query = |skip_frames, imgsz, conf, max_frames| VideoQuery {
            skip_frames,
            imgsz,
            conf,
            max_frames,
            save_annotated: false,
        };
        assert!(query(2, 640, 0.35, None).validate().is_ok());
        assert!(query(0, 640, 0.35, None).validate().is_err());
        assert!(query(2, 0, 0.35, None).validate().is_err());
        assert!(query(2, 640, 1.01, None).validate().is_err());
        assert!(query(2, 640, 0.35, Some(0)).validate().is_err());
    }
}
