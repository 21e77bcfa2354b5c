//! Server side of the assistant: forwards a chat request to an
//! OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::chat::{AssistantBackend, AssistantRequest, HISTORY_LIMIT};
use crate::error::AssistantError;
use crate::types::Role;

pub const DEFAULT_LLM_BASE_URL: &str = "https://ai.gateway.lovable.dev/v1";
pub const DEFAULT_LLM_MODEL: &str = "google/gemini-2.5-flash";

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 500;
const EMPTY_COMPLETION: &str = "Desculpe, não consegui processar sua mensagem.";

pub const SYSTEM_PROMPT: &str = "Você é o assistente virtual do SOS Cidadão, um app brasileiro que ajuda pessoas a encontrar contatos de serviços públicos e emergências.

Seu trabalho é:
1. Entender o que o usuário precisa de forma natural (ele pode falar de vários jeitos)
2. Identificar qual serviço está relacionado
3. Dar uma resposta útil e amigável

SERVIÇOS DISPONÍVEIS:
- SAMU (192): emergências médicas, ambulância, primeiros socorros, mal súbito, acidente
- Bombeiros (193): incêndio, resgate, afogamento, desabamento, animais presos
- Polícia (190): assalto, roubo, violência, emergência policial
- Água: falta de água, vazamento, conta de água, problema com água, sem água, caixa d'água
- Energia: falta de luz, queda de energia, sem energia, poste caído, fio solto, conta de luz
- Gás: vazamento de gás, cheiro de gás, problema com gás
- Prefeitura: buraco na rua, iluminação pública, lixo, esgoto, problemas urbanos

COMO RESPONDER:
- Seja natural e empático, como um amigo ajudando
- Use português brasileiro informal mas respeitoso
- Se identificar o serviço, mencione o número/contato
- Se for emergência de vida (SAMU/Bombeiros/Polícia), seja direto e urgente
- Para serviços de concessionárias (água/luz/gás), pergunte o CEP se ainda não souber
- Pode fazer perguntas para entender melhor a situação

Responda de forma concisa (máximo 3-4 frases) a menos que precise de mais detalhes.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

impl CompletionMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// System prompt, the last turns of history, then the message with its postal-code context
pub fn build_messages(request: &AssistantRequest) -> Vec<CompletionMessage> {
    let mut messages = vec![CompletionMessage::new("system", SYSTEM_PROMPT)];

    let history = &request.conversation_history;
    let skip = history.len().saturating_sub(HISTORY_LIMIT);
    for turn in &history[skip..] {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(CompletionMessage::new(role, &turn.content));
    }

    let content = match request.postal_code.as_deref().filter(|c| !c.is_empty()) {
        Some(cep) => format!(
            "[Contexto: CEP do usuário é {}]\n\nUsuário: {}",
            cep, request.message
        ),
        None => request.message.clone(),
    };
    messages.push(CompletionMessage::new("user", &content));
    messages
}

/// Forwards chat requests to the completion service
#[derive(Debug, Clone)]
pub struct CompletionGateway {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl CompletionGateway {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    /// Resolve the chat completions endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    pub async fn complete(&self, request: &AssistantRequest) -> Result<String, AssistantError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            tracing::error!("completion API key not configured");
            AssistantError::MissingApiKey
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(request),
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });

        tracing::info!(
            history = request.conversation_history.len(),
            "sending request to completion service"
        );
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %text, "completion service error");
            return Err(AssistantError::from_status(status.as_u16()));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::InvalidResponse(e.to_string()))?;

        // choices[0].message.content, which may be null
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(EMPTY_COMPLETION)
            .to_string();

        Ok(content)
    }
}

impl AssistantBackend for CompletionGateway {
    async fn reply(&self, request: &AssistantRequest) -> Result<String, AssistantError> {
        self.complete(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::HistoryTurn;
    use crate::test_support::spawn_mock;
    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Json, Response};
    use axum::routing::post;
    use std::sync::{Arc, Mutex};

    fn turn(role: Role, content: &str) -> HistoryTurn {
        HistoryTurn {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_messages_with_postal_code_context() {
        let request = AssistantRequest {
            message: "sem luz".to_string(),
            postal_code: Some("01310100".to_string()),
            conversation_history: vec![turn(Role::User, "oi"), turn(Role::Assistant, "Olá!")],
        };
        let messages = build_messages(&request);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(
            messages[3].content,
            "[Contexto: CEP do usuário é 01310100]\n\nUsuário: sem luz"
        );
    }

    #[test]
    fn test_history_is_capped() {
        let history = (0..25)
            .map(|i| turn(Role::User, &format!("m{}", i)))
            .collect();
        let request = AssistantRequest {
            message: "agora".to_string(),
            postal_code: None,
            conversation_history: history,
        };
        let messages = build_messages(&request);

        assert_eq!(messages.len(), 1 + HISTORY_LIMIT + 1);
        assert_eq!(messages[1].content, "m15");
        assert_eq!(messages.last().unwrap().content, "agora");
    }

    #[test]
    fn test_endpoint_resolution() {
        let gateway = |base: &str| {
            CompletionGateway::new(base, DEFAULT_LLM_MODEL, None, Duration::from_secs(1)).unwrap()
        };
        assert_eq!(
            gateway("https://ai.gateway.lovable.dev/v1").endpoint(),
            "https://ai.gateway.lovable.dev/v1/chat/completions"
        );
        assert_eq!(
            gateway("http://localhost:1234/").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
        assert_eq!(
            gateway("http://h/v1/chat/completions").endpoint(),
            "http://h/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let gateway = CompletionGateway::new(
            DEFAULT_LLM_BASE_URL,
            DEFAULT_LLM_MODEL,
            Some(String::new()),
            Duration::from_secs(1),
        )
        .unwrap();
        let request = AssistantRequest {
            message: "oi".to_string(),
            postal_code: None,
            conversation_history: Vec::new(),
        };
        assert_eq!(
            gateway.complete(&request).await,
            Err(AssistantError::MissingApiKey)
        );
    }

    #[derive(Default)]
    struct SeenCompletion {
        authorization: Option<String>,
        body: serde_json::Value,
    }

    /// Completion stand-in; the last user message selects the answer
    async fn completions_handler(
        State(seen): State<Arc<Mutex<SeenCompletion>>>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> Response {
        let last = body["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();
        {
            let mut seen = seen.lock().unwrap();
            seen.authorization = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            seen.body = body;
        }
        match last.as_str() {
            "429" => StatusCode::TOO_MANY_REQUESTS.into_response(),
            "402" => StatusCode::PAYMENT_REQUIRED.into_response(),
            "503" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            "vazio" => Json(serde_json::json!({
                "choices": [{ "message": { "content": null } }]
            }))
            .into_response(),
            "sem escolhas" => Json(serde_json::json!({ "choices": [] })).into_response(),
            _ => Json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Ligue 0800." } }]
            }))
            .into_response(),
        }
    }

    async fn mock_gateway() -> (CompletionGateway, Arc<Mutex<SeenCompletion>>) {
        let seen = Arc::new(Mutex::new(SeenCompletion::default()));
        let app = Router::new()
            .route("/v1/chat/completions", post(completions_handler))
            .with_state(seen.clone());
        let base = spawn_mock(app).await;
        let gateway = CompletionGateway::new(
            &format!("{}/v1", base),
            DEFAULT_LLM_MODEL,
            Some("test-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        (gateway, seen)
    }

    fn request(message: &str) -> AssistantRequest {
        AssistantRequest {
            message: message.to_string(),
            postal_code: None,
            conversation_history: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_completion_request_and_reply() {
        let (gateway, seen) = mock_gateway().await;

        let reply = gateway.complete(&request("sem luz")).await;
        assert_eq!(reply, Ok("Ligue 0800.".to_string()));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.authorization.as_deref(), Some("Bearer test-key"));
        assert_eq!(seen.body["model"], DEFAULT_LLM_MODEL);
        assert_eq!(seen.body["max_tokens"], MAX_TOKENS);
        assert!((seen.body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(seen.body["messages"][0]["content"], SYSTEM_PROMPT);
    }

    #[tokio::test]
    async fn test_empty_completion_uses_default_text() {
        let (gateway, _seen) = mock_gateway().await;
        for message in ["vazio", "sem escolhas"] {
            assert_eq!(
                gateway.complete(&request(message)).await,
                Ok(EMPTY_COMPLETION.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_completion_status_mapping() {
        let (gateway, _seen) = mock_gateway().await;
        assert_eq!(
            gateway.complete(&request("429")).await,
            Err(AssistantError::RateLimited)
        );
        assert_eq!(
            gateway.complete(&request("402")).await,
            Err(AssistantError::QuotaExceeded)
        );
        assert_eq!(
            gateway.complete(&request("503")).await,
            Err(AssistantError::Status(503))
        );
    }
}
