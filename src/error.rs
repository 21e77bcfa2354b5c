//! Error types for location resolution and the assistant gateway

use thiserror::Error;

/// Outcome of a failed smart lookup.
///
/// `NotFound`: every resolver answered and none matched.
/// `Resolution`: at least one resolver call could not be completed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Empty input or a postal code with the wrong number of digits
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No resolver produced a match
    #[error("Location not found")]
    NotFound,

    /// An external resolver failed (network, status, payload)
    #[error("Location resolution failed: {0}")]
    Resolution(String),
}

impl LookupError {
    /// Message suitable for showing to the person searching.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => {
                "Digite um CEP com 8 dígitos, o nome da cidade ou \"cidade, UF\"."
            }
            Self::NotFound => {
                "Localização não encontrada. Verifique o CEP ou o nome da cidade e tente novamente."
            }
            Self::Resolution(_) => {
                "Não foi possível consultar o serviço de endereços agora. Tente novamente em instantes."
            }
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        Self::Resolution(e.to_string())
    }
}

/// Failure while acquiring a position or reverse-geocoding it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeolocationError {
    #[error("Permissão de localização negada. Ative nas configurações do seu navegador.")]
    PermissionDenied,

    #[error("Localização indisponível. Verifique se o GPS está ativado.")]
    PositionUnavailable,

    #[error("Tempo esgotado ao tentar obter localização.")]
    Timeout,

    #[error("Geolocalização não suportada neste dispositivo.")]
    Unsupported,

    #[error("Erro ao obter localização.")]
    Unknown,

    #[error("Erro ao buscar endereço: {0}")]
    ReverseGeocoding(String),
}

impl From<reqwest::Error> for GeolocationError {
    fn from(e: reqwest::Error) -> Self {
        Self::ReverseGeocoding(e.to_string())
    }
}

/// Any reason the assistant could not produce a reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssistantError {
    #[error("Muitas requisições, tente novamente em alguns segundos.")]
    RateLimited,

    #[error("Limite de uso atingido.")]
    QuotaExceeded,

    #[error("Assistant returned status {0}")]
    Status(u16),

    #[error("Assistant request failed: {0}")]
    Transport(String),

    #[error("Invalid assistant response: {0}")]
    InvalidResponse(String),

    #[error("API key não configurada")]
    MissingApiKey,
}

impl AssistantError {
    /// Text returned to chat clients in the `error` field.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimited => "Muitas requisições, tente novamente em alguns segundos.",
            Self::QuotaExceeded => "Limite de uso atingido.",
            Self::MissingApiKey => "API key não configurada",
            _ => "Erro ao processar mensagem",
        }
    }

    /// Classify a non-2xx status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            402 => Self::QuotaExceeded,
            other => Self::Status(other),
        }
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Failure while loading the contact directory.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Failed to read directory file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse directory data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid postal code range {start}..={end}: {reason}")]
    InvalidRange {
        start: String,
        end: String,
        reason: String,
    },

    #[error("Range {start}..={end} points at unknown city '{city}'")]
    UnknownCity {
        start: String,
        end: String,
        city: String,
    },

    #[error("Postal code ranges overlap: '{earlier}' shadows '{later}' on {start:08}..={end:08}")]
    Overlap {
        earlier: String,
        later: String,
        start: u32,
        end: u32,
    },
}
