use super::parsing::{
    env_optional, env_or_default, env_required, is_supported_upload_extension,
    parse_answer_layout, parse_bool, parse_cors_origins, parse_environment, parse_positive_usize,
    parse_string_list, parse_u32, parse_u64,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DocumentParseSettings, GradingSettings,
    RuntimeSettings, ServerHost, ServerPort, ServerSettings, Settings, StorageSettings,
    TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADER_HOST", "0.0.0.0");
        let port = env_or_default("GRADER_PORT", "8000");

        let environment =
            parse_environment(env_optional("GRADER_ENV").or_else(|| env_optional("ENVIRONMENT")));

        let project_name = env_or_default("PROJECT_NAME", "Exam Grader API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let upstage_api_key = env_required("UPSTAGE_API_KEY")?;
        let document_parse_url = env_or_default(
            "DOCUMENT_PARSE_URL",
            "https://api.upstage.ai/v1/document-digitization",
        );
        let document_parse_timeout_seconds = parse_u64(
            "DOCUMENT_PARSE_TIMEOUT_SECONDS",
            env_or_default("DOCUMENT_PARSE_TIMEOUT_SECONDS", "120"),
        )?;
        let document_parse_max_retries = parse_u32(
            "DOCUMENT_PARSE_MAX_RETRIES",
            env_or_default("DOCUMENT_PARSE_MAX_RETRIES", "2"),
        )?;

        let ai_api_key = env_optional("AI_API_KEY").unwrap_or_else(|| upstage_api_key.clone());
        let ai_base_url = env_or_default("AI_BASE_URL", "https://api.upstage.ai/v1");
        let ai_model = env_or_default("AI_MODEL", "solar-pro");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2048"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let upload_dir = env_or_default("UPLOAD_DIR", "uploads");
        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "20"))?;
        let allowed_document_extensions =
            parse_string_list(env_optional("ALLOWED_DOCUMENT_EXTENSIONS"), &["pdf"]);
        let allowed_submission_extensions = parse_string_list(
            env_optional("ALLOWED_SUBMISSION_EXTENSIONS"),
            &["jpg", "jpeg", "png", "pdf"],
        );

        let chunk_max_pages =
            parse_positive_usize("CHUNK_MAX_PAGES", env_or_default("CHUNK_MAX_PAGES", "10"))?;
        let answer_layout =
            parse_answer_layout("ANSWER_LAYOUT", env_or_default("ANSWER_LAYOUT", "auto"))?;
        let session_ttl_minutes = parse_u64(
            "GRADING_SESSION_TTL_MINUTES",
            env_or_default("GRADING_SESSION_TTL_MINUTES", "240"),
        )?;

        let log_level = env_or_default("GRADER_LOG_LEVEL", "info");
        let json = env_optional("GRADER_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            document_parse: DocumentParseSettings {
                api_key: upstage_api_key,
                url: document_parse_url,
                timeout_seconds: document_parse_timeout_seconds,
                max_retries: document_parse_max_retries,
            },
            ai: AiSettings {
                api_key: ai_api_key,
                base_url: ai_base_url,
                model: ai_model,
                max_tokens: ai_max_tokens,
                request_timeout: ai_request_timeout,
            },
            storage: StorageSettings {
                upload_dir,
                max_upload_size_mb,
                allowed_document_extensions,
                allowed_submission_extensions,
            },
            grading: GradingSettings { chunk_max_pages, answer_layout, session_ttl_minutes },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn document_parse(&self) -> &DocumentParseSettings {
        &self.document_parse
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn grading(&self) -> &GradingSettings {
        &self.grading
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_extensions(
            "ALLOWED_DOCUMENT_EXTENSIONS",
            &self.storage.allowed_document_extensions,
        )?;
        validate_extensions(
            "ALLOWED_SUBMISSION_EXTENSIONS",
            &self.storage.allowed_submission_extensions,
        )?;

        if self.storage.max_upload_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_UPLOAD_SIZE_MB",
                value: "0".to_string(),
            });
        }

        if self.storage.upload_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "UPLOAD_DIR",
                value: String::from("<empty>"),
            });
        }

        if self.grading.session_ttl_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "GRADING_SESSION_TTL_MINUTES",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_extensions(field: &'static str, extensions: &[String]) -> Result<(), ConfigError> {
    if extensions.is_empty() {
        return Err(ConfigError::InvalidValue { field, value: String::from("<empty>") });
    }

    for extension in extensions {
        if !is_supported_upload_extension(extension) {
            return Err(ConfigError::InvalidValue { field, value: extension.clone() });
        }
    }

    Ok(())
}
