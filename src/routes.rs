use std::sync::Arc;

use poem_openapi::payload::{Json, PlainText};
use poem_openapi::{ApiResponse, Object, OpenApi};

use crate::controller::{ResizeRequest, ThumbnailController};

#[derive(Object, Debug)]
pub struct ResizePayload {
    #[oai(default)]
    /// The width of the thumbnail, `0` or missing to derive it from the height.
    width: u32,

    #[oai(default)]
    /// The height of the thumbnail, `0` or missing to derive it from the width.
    height: u32,

    /// The compression quality from 0 to 100.
    compression: u32,

    /// The output format, e.g. `jpg` or `png`.
    format: String,

    /// The location of the source image.
    url: String,
}

impl From<ResizePayload> for ResizeRequest {
    fn from(payload: ResizePayload) -> Self {
        Self {
            url: payload.url,
            width: payload.width,
            height: payload.height,
            format: payload.format,
            compression: payload.compression,
        }
    }
}

#[derive(Object, Debug)]
pub struct ResizedInfo {
    /// The location the thumbnail was published to.
    url: String,
}

#[derive(ApiResponse)]
pub enum ResizeResponse {
    /// The thumbnail has been created and published.
    #[oai(status = 200)]
    Ok(Json<ResizedInfo>),

    /// The request could not be fulfilled, the body explains why.
    #[oai(status = 400)]
    BadRequest(PlainText<String>),
}

pub struct ThumbnailerApi {
    controller: Arc<ThumbnailController>,
}

impl ThumbnailerApi {
    pub fn new(controller: Arc<ThumbnailController>) -> Self {
        Self { controller }
    }
}

#[OpenApi]
impl ThumbnailerApi {
    /// Create Thumbnail
    ///
    /// Fetches the source image, resizes and re-encodes it and publishes
    /// the result to the configured bucket.
    #[oai(path = "/", method = "post")]
    pub async fn create_thumbnail(&self, payload: Json<ResizePayload>) -> ResizeResponse {
        let request = ResizeRequest::from(payload.0);

        match self.controller.process(&request).await {
            Ok(result) => {
                debug!("Request for {} completed in {:?}", &request.url, result.execution_time);
                ResizeResponse::Ok(Json(ResizedInfo {
                    url: result.upload.location,
                }))
            },
            Err(e) => {
                warn!("Failed to process {} at the {} stage: {}", &request.url, e.stage(), e);
                ResizeResponse::BadRequest(PlainText(e.to_string()))
            },
        }
    }
}
