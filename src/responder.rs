//! Answers free-form questions: language model first, then canned replies,
//! then a static apology.

use tracing::{debug, info};

use crate::fallback::fallback_reply;
use crate::llm::{ChatModel, LlmClient};
use crate::localization::t_lang;
use crate::prompt::{build_prompt, PromptContext};
use crate::transport::{truncate_message, LLM_RESPONSE_MAX_LEN};

/// Which stage of the chain produced an answer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseSource {
    Llm,
    Fallback,
    Apology,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedResponse {
    pub text: String,
    pub source: ResponseSource,
}

pub struct ResponseGenerator<M = LlmClient> {
    model: Option<M>,
    clinic_name: String,
}

impl<M: ChatModel> ResponseGenerator<M> {
    /// `model` is `None` when no language model is configured
    pub fn new(model: Option<M>, clinic_name: impl Into<String>) -> Self {
        Self {
            model,
            clinic_name: clinic_name.into(),
        }
    }

    pub fn model(&self) -> Option<&M> {
        self.model.as_ref()
    }

    pub async fn respond(
        &self,
        question: &str,
        context: &PromptContext,
        language_code: Option<&str>,
    ) -> GeneratedResponse {
        if let Some(model) = &self.model {
            let prompt = build_prompt(&self.clinic_name, question, context);
            match model.complete(&prompt).await {
                Ok(answer) => {
                    let notice = t_lang("response-truncated", language_code);
                    return GeneratedResponse {
                        text: truncate_message(&answer, LLM_RESPONSE_MAX_LEN, &notice),
                        source: ResponseSource::Llm,
                    };
                }
                Err(err) => debug!(error = %err, "Falling back to canned replies"),
            }
        }

        if let Some(text) = fallback_reply(question, language_code) {
            info!(source = "fallback", "Answered from canned replies");
            return GeneratedResponse {
                text,
                source: ResponseSource::Fallback,
            };
        }

        GeneratedResponse {
            text: t_lang("answer-apology", language_code),
            source: ResponseSource::Apology,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::prompt::Prompt;
    use std::sync::Mutex;

    struct ScriptedModel {
        answer: Option<String>,
        prompts: Mutex<Vec<Prompt>>,
    }

    impl ScriptedModel {
        fn answering(answer: Option<&str>) -> Self {
            Self {
                answer: answer.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatModel for ScriptedModel {
        async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.answer.clone().ok_or(LlmError::EmptyContent)
        }
    }

    #[tokio::test]
    async fn test_model_answer_wins() {
        let generator = ResponseGenerator::new(Some(ScriptedModel::answering(Some("Ответ модели"))), "Клиника");
        let response = generator.respond("Сколько стоит?", &PromptContext::default(), Some("ru")).await;

        assert_eq!(response.source, ResponseSource::Llm);
        assert_eq!(response.text, "Ответ модели");
        let prompts = generator.model().unwrap().prompts.lock().unwrap();
        assert!(prompts[0].user.contains("Сколько стоит?"));
    }

    #[tokio::test]
    async fn test_long_model_answer_is_truncated() {
        let long = "слово ".repeat(1000);
        let generator = ResponseGenerator::new(Some(ScriptedModel::answering(Some(&long))), "Клиника");
        let response = generator.respond("Расскажите", &PromptContext::default(), Some("ru")).await;

        assert_eq!(response.source, ResponseSource::Llm);
        assert!(response.text.ends_with("(ответ сокращен для отображения в Telegram)"));
        assert!(response.text.chars().count() < 3600);
    }

    #[tokio::test]
    async fn test_falls_back_on_model_failure() {
        let generator = ResponseGenerator::new(Some(ScriptedModel::answering(None)), "Клиника");
        let response = generator.respond("Какие риски?", &PromptContext::default(), Some("ru")).await;
        assert_eq!(response.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn test_apology_without_model_or_keyword() {
        let generator: ResponseGenerator<ScriptedModel> = ResponseGenerator::new(None, "Клиника");
        let response = generator.respond("Добрый вечер", &PromptContext::default(), Some("ru")).await;

        assert_eq!(response.source, ResponseSource::Apology);
        assert!(response.text.starts_with("Понимаю ваш вопрос"));
    }
}
