use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::CoreError;
use crate::kernel::Kernel;
use crate::store::durable::Language;
use crate::store::LanguageId;

#[derive(Serialize)]
pub struct LanguageSummary {
    pub id: LanguageId,
    pub name: String,
    pub runtime: String,
    pub version: String,
    pub default_time_limit_ms: i32,
    pub default_memory_mb: i32,
}

impl From<&Language> for LanguageSummary {
    fn from(language: &Language) -> Self {
        Self {
            id: language.id,
            name: language.name.clone(),
            runtime: language.runtime.clone(),
            version: language.version.clone(),
            default_time_limit_ms: language.default_time_limit_ms,
            default_memory_mb: language.default_memory_mb,
        }
    }
}

#[derive(Serialize)]
pub struct LanguageListResponse {
    pub total: usize,
    pub languages: Vec<LanguageSummary>,
}

#[derive(Serialize)]
pub struct LanguageDetailResponse {
    #[serde(flatten)]
    pub summary: LanguageSummary,
    pub template_code: String,
    pub file_name: String,
}

/// `GET /languages` (§6).
pub async fn list_languages(
    State(kernel): State<Kernel>,
) -> Result<Json<LanguageListResponse>, CoreError> {
    let languages = kernel.durable.list_languages().await?;
    let languages: Vec<LanguageSummary> = languages.iter().map(LanguageSummary::from).collect();
    Ok(Json(LanguageListResponse {
        total: languages.len(),
        languages,
    }))
}

/// `GET /languages/:id` (§6).
pub async fn get_language(
    State(kernel): State<Kernel>,
    Path(id): Path<LanguageId>,
) -> Result<Json<LanguageDetailResponse>, CoreError> {
    let language = kernel
        .durable
        .get_language(id)
        .await?
        .ok_or_else(|| CoreError::LanguageNotFound(id.to_string()))?;

    Ok(Json(LanguageDetailResponse {
        summary: LanguageSummary::from(&language),
        template_code: language.template_code,
        file_name: language.file_name,
    }))
}
