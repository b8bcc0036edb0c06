use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_cors_origins,
    parse_environment, parse_layout_kind, parse_string_list, parse_u16, parse_u32, parse_u64,
};
use super::types::{
    AiSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, RuntimeSettings,
    S3Settings, ServerHost, ServerPort, ServerSettings, Settings, SheetSettings, StorageSettings,
    TelemetrySettings, VisionSettings, DEFAULT_PDF_RENDER_DPI, PDF_RENDER_DPI_RANGE,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GABARITO_HOST", "0.0.0.0");
        let port = env_or_default("GABARITO_PORT", "8000");

        let environment = parse_environment(
            env_optional("GABARITO_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("GABARITO_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gabarito API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "gabarito");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gabarito_db");
        let database_url = env_optional("DATABASE_URL");

        let openai_api_key = env_or_default("OPENAI_API_KEY", "");
        let openai_base_url = env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1");
        let ai_model = env_or_default("AI_MODEL", "gpt-4o");
        let ai_max_tokens = parse_u32("AI_MAX_TOKENS", env_or_default("AI_MAX_TOKENS", "2000"))?;
        let ai_request_timeout =
            parse_u64("AI_REQUEST_TIMEOUT", env_or_default("AI_REQUEST_TIMEOUT", "120"))?;

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "15"))?;
        let allowed_image_extensions = parse_string_list(
            env_optional("ALLOWED_IMAGE_EXTENSIONS"),
            &["jpg", "jpeg", "png", "webp", "pdf"],
        );

        let s3_endpoint = env_or_default("S3_ENDPOINT", "");
        let s3_access_key = env_or_default("S3_ACCESS_KEY", "");
        let s3_secret_key = env_or_default("S3_SECRET_KEY", "");
        let s3_bucket = env_or_default("S3_BUCKET", "gabarito-media");
        let s3_region = env_or_default("S3_REGION", "auto");
        let presigned_url_expire_minutes = parse_u64(
            "PRESIGNED_URL_EXPIRE_MINUTES",
            env_or_default("PRESIGNED_URL_EXPIRE_MINUTES", "15"),
        )?;

        let layout = parse_layout_kind(env_optional("SHEET_LAYOUT"))?;
        let ocr_enabled =
            env_optional("OCR_ENABLED").map(|value| parse_bool(&value)).unwrap_or(true);
        let tesseract_bin = env_or_default("TESSERACT_BIN", "tesseract");
        let pdftoppm_bin = env_or_default("PDFTOPPM_BIN", "pdftoppm");
        let pdf_render_dpi = env_optional("PDF_RENDER_DPI")
            .map(|value| parse_u32("PDF_RENDER_DPI", value))
            .transpose()?
            .unwrap_or(DEFAULT_PDF_RENDER_DPI);

        let max_sheets_per_batch =
            parse_u32("MAX_SHEETS_PER_BATCH", env_or_default("MAX_SHEETS_PER_BATCH", "500"))?;

        let log_level = env_or_default("GABARITO_LOG_LEVEL", "info");
        let json = env_optional("GABARITO_LOG_JSON")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false);
        let prometheus_enabled = env_optional("PROMETHEUS_ENABLED")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            ai: AiSettings {
                openai_api_key,
                openai_base_url,
                ai_model,
                ai_max_tokens,
                ai_request_timeout,
            },
            storage: StorageSettings { max_upload_size_mb, allowed_image_extensions },
            s3: S3Settings {
                endpoint: s3_endpoint,
                access_key: s3_access_key,
                secret_key: s3_secret_key,
                bucket: s3_bucket,
                region: s3_region,
                presigned_url_expire_minutes,
            },
            vision: VisionSettings {
                layout,
                ocr_enabled,
                tesseract_bin,
                pdftoppm_bin,
                pdf_render_dpi,
            },
            sheets: SheetSettings { max_sheets_per_batch },
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

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn ai(&self) -> &AiSettings {
        &self.ai
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn s3(&self) -> &S3Settings {
        &self.s3
    }

    pub(crate) fn vision(&self) -> &VisionSettings {
        &self.vision
    }

    pub(crate) fn sheets(&self) -> &SheetSettings {
        &self.sheets
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if !PDF_RENDER_DPI_RANGE.contains(&self.vision.pdf_render_dpi) {
            return Err(ConfigError::InvalidValue {
                field: "PDF_RENDER_DPI",
                value: self.vision.pdf_render_dpi.to_string(),
            });
        }

        if self.sheets.max_sheets_per_batch == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_SHEETS_PER_BATCH",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.ai.openai_api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_API_KEY"));
        }
        if self.ai.openai_base_url.is_empty() {
            return Err(ConfigError::MissingSecret("OPENAI_BASE_URL"));
        }
        if self.s3.access_key.is_empty() != self.s3.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret("S3_ACCESS_KEY/S3_SECRET_KEY"));
        }

        Ok(())
    }
}
