//! Chat session state and the client side of the assistant gateway.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::directory::EMERGENCY_NUMBERS;
use crate::error::AssistantError;
use crate::postal_code;
use crate::types::{ChatMessage, Role};

/// Most recent turns forwarded with each message
pub const HISTORY_LIMIT: usize = 10;

/// One prior turn as sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /chat-ai`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantRequest {
    #[serde(default)]
    pub message: String,
    #[serde(
        rename = "cep",
        alias = "postalCode",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub postal_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_history")]
    pub conversation_history: Vec<HistoryTurn>,
}

/// History as browsers send it: a non-array is ignored, and any role other
/// than `user` counts as the assistant.
fn lenient_history<'de, D>(deserializer: D) -> Result<Vec<HistoryTurn>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(serde_json::Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .iter()
        .map(|item| HistoryTurn {
            role: if item["role"] == "user" {
                Role::User
            } else {
                Role::Assistant
            },
            content: item["content"].as_str().unwrap_or_default().to_string(),
        })
        .collect())
}

/// Gateway answer: `{ response }` on success, `{ error }` otherwise
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Anything that can answer a chat message
pub trait AssistantBackend: Send + Sync {
    fn reply(
        &self,
        request: &AssistantRequest,
    ) -> impl Future<Output = Result<String, AssistantError>> + Send;
}

/// HTTP client for the assistant gateway endpoint
#[derive(Debug, Clone)]
pub struct AssistantClient {
    http_client: Client,
    endpoint: Url,
}

impl AssistantClient {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid assistant URL: {}", endpoint))?;
        Ok(Self {
            http_client,
            endpoint,
        })
    }
}

impl AssistantBackend for AssistantClient {
    async fn reply(&self, request: &AssistantRequest) -> Result<String, AssistantError> {
        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistantError::from_status(status.as_u16()));
        }

        let body: AssistantReply = response
            .json()
            .await
            .map_err(|e| AssistantError::InvalidResponse(e.to_string()))?;
        match (body.response, body.error) {
            (Some(text), _) => Ok(text),
            (None, Some(error)) => Err(AssistantError::InvalidResponse(error)),
            (None, None) => Err(AssistantError::InvalidResponse(
                "missing response field".to_string(),
            )),
        }
    }
}

/// Static reply used whenever the assistant is unavailable
pub fn fallback_reply() -> String {
    let mut reply = String::from(
        "O assistente está indisponível no momento. Em caso de emergência, ligue:\n",
    );
    for entry in &EMERGENCY_NUMBERS {
        reply.push_str(&format!("\n• {}: {}", entry.label, entry.number));
    }
    reply
}

/// Opening line per service the user came from
const SERVICE_GREETINGS: [(&str, &str); 6] = [
    (
        "energia",
        "Entendo que você está enfrentando problemas com a energia elétrica. Vou verificar as informações da sua região.",
    ),
    (
        "samu",
        "Esta é uma linha de emergência médica. Se você está em uma situação de risco de vida, ligue imediatamente para 192.",
    ),
    (
        "policia",
        "Para emergências policiais, ligue 190. Posso ajudá-lo a registrar uma ocorrência não emergencial.",
    ),
    (
        "bombeiros",
        "Para emergências com incêndio ou resgate, ligue 193. Como posso ajudá-lo?",
    ),
    (
        "prefeitura",
        "Vou conectá-lo aos serviços da prefeitura da sua cidade. Qual serviço você precisa?",
    ),
    (
        "outros",
        "Posso ajudá-lo com diversos serviços essenciais. O que você está precisando?",
    ),
];

const DEFAULT_GREETING: &str = "Como posso ajudá-lo hoje?";

/// First assistant message of a freshly opened chat
pub fn welcome_message(cep: Option<&str>, service: Option<&str>) -> String {
    let mut text = String::from("Olá! Sou o assistente do SOS Cidadão. ");
    if let Some(cep) = cep.filter(|c| !c.is_empty()) {
        text.push_str(&format!(
            "Identifiquei sua localização pelo CEP {}. ",
            postal_code::format_display(cep)
        ));
    }
    let greeting = service
        .and_then(|key| SERVICE_GREETINGS.iter().find(|(k, _)| *k == key))
        .map(|(_, line)| *line)
        .unwrap_or(DEFAULT_GREETING);
    text.push_str(greeting);
    text
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Transcript of one open chat widget; nothing survives [`ChatSession::clear`]
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    next_id: u64,
    postal_code: Option<String>,
}

impl ChatSession {
    pub fn new(postal_code: Option<String>) -> Self {
        Self {
            postal_code,
            ..Default::default()
        }
    }

    /// Session seeded with the welcome message, optionally tailored to a service
    pub fn open(postal_code: Option<String>, service: Option<&str>) -> Self {
        let mut session = Self::new(postal_code);
        let welcome = welcome_message(session.postal_code(), service);
        session.push(Role::Assistant, &welcome);
        session
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn postal_code(&self) -> Option<&str> {
        self.postal_code.as_deref()
    }

    pub fn push(&mut self, role: Role, content: &str) -> &ChatMessage {
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id: self.next_id,
            role,
            content: content.to_string(),
            timestamp: now_millis(),
        });
        &self.messages[self.messages.len() - 1]
    }

    /// The last [`HISTORY_LIMIT`] messages, oldest first
    pub fn history(&self) -> Vec<HistoryTurn> {
        let skip = self.messages.len().saturating_sub(HISTORY_LIMIT);
        self.messages[skip..]
            .iter()
            .map(|m| HistoryTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Request for `message`, carrying the turns that precede it
    pub fn request_for(&self, message: &str) -> AssistantRequest {
        AssistantRequest {
            message: message.to_string(),
            postal_code: self.postal_code.clone(),
            conversation_history: self.history(),
        }
    }

    /// Send a user message and append the reply, or the fallback text on failure
    pub async fn ask<B: AssistantBackend>(&mut self, backend: &B, text: &str) -> &ChatMessage {
        let request = self.request_for(text);
        self.push(Role::User, text);

        let reply = match backend.reply(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "assistant unavailable, using fallback reply");
                fallback_reply()
            }
        };
        self.push(Role::Assistant, &reply)
    }

    /// Closing the widget drops the whole transcript
    pub fn clear(&mut self) {
        self.messages.clear();
        self.next_id = 0;
    }
}
