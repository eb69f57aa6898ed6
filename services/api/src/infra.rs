use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use verihire::config::{AppConfig, ShortlistDefaults};
use verihire::error::AppError;
use verihire::verification::{
    AutoShortlistRule, LanguageModel, MemoryDocumentStore, OpenAiChatModel, VerificationService,
    VerificationServiceError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Service = VerificationService<MemoryDocumentStore>;

/// Chat-completions client for the configured endpoint. A missing API key only fails once a
/// call is attempted.
pub(crate) fn language_model(config: &AppConfig) -> Result<Arc<dyn LanguageModel>, AppError> {
    let model = OpenAiChatModel::new(&config.llm)?;
    Ok(Arc::new(model))
}

pub(crate) fn initial_rule(defaults: &ShortlistDefaults) -> Result<AutoShortlistRule, AppError> {
    AutoShortlistRule::new(defaults.min_trust_score, defaults.max_risk_score)
        .map_err(|err| AppError::from(VerificationServiceError::from(err)))
}

pub(crate) fn build_service(
    config: &AppConfig,
    model: Arc<dyn LanguageModel>,
) -> Result<Arc<Service>, AppError> {
    let store = Arc::new(MemoryDocumentStore::default());
    let rule = initial_rule(&config.shortlist)?;
    Ok(Arc::new(VerificationService::new(
        store,
        model,
        config.llm.timeout,
        rule,
    )))
}
