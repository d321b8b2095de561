//! Prompt assembly for the clinic assistant persona.

use crate::db::{ChatLog, Service};

/// How many history turns are shown to the model
pub const HISTORY_TURNS: usize = 4;
/// Longest history turn passed to the model, in characters
const MAX_TURN_CHARS: usize = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// Service facts shown to the model
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceFacts {
    pub name: String,
    pub description: Option<String>,
    pub indications: Option<String>,
    pub methods: Option<String>,
    pub duration: Option<String>,
    pub recovery: Option<String>,
    pub price_range: Option<String>,
}

impl From<&Service> for ServiceFacts {
    fn from(service: &Service) -> Self {
        Self {
            name: service.name.clone(),
            description: service.description.clone(),
            indications: service.indications.clone(),
            methods: service.methods.clone(),
            duration: service.duration.clone(),
            recovery: service.recovery.clone(),
            price_range: service.price_range.clone(),
        }
    }
}

/// Everything known about the conversation besides the question itself
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptContext {
    pub service: Option<ServiceFacts>,
    /// Oldest turn first
    pub history: Vec<HistoryTurn>,
    /// Pre-formatted excerpt from the clinic website
    pub website: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Turn chat logs (newest first, as stored) into history turns, oldest first
pub fn history_from_logs(logs: &[ChatLog]) -> Vec<HistoryTurn> {
    let mut turns = Vec::with_capacity(logs.len() * 2);

    for log in logs.iter().rev() {
        turns.push(HistoryTurn {
            role: Role::User,
            text: log.message.clone(),
        });
        if let Some(response) = log.response.as_deref().filter(|r| !r.trim().is_empty()) {
            turns.push(HistoryTurn {
                role: Role::Assistant,
                text: response.to_string(),
            });
        }
    }

    turns
}

fn system_prompt(clinic_name: &str) -> String {
    format!(
        "Ты — Анна, виртуальный помощник клиники пластической хирургии «{clinic_name}».
Твой стиль общения: дружелюбный, профессиональный, сочувствующий, но без излишней фамильярности.
Ты даешь точную медицинскую информацию, но всегда уточняешь, что окончательный ответ может дать только хирург на консультации.

Правила:
1. Отвечай именно на заданный вопрос, кратко (2-5 предложений).
2. Не добавляй префиксы вроде «Анна:».
3. Не выдумывай информацию, которой нет в контексте.
4. Если не знаешь ответа, предложи связаться с живым менеджером.
5. Отвечай на языке, на котором задан вопрос."
    )
}

fn push_fact(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        out.push_str(label);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{clipped}…")
}

/// Build the system and user messages for a question
pub fn build_prompt(clinic_name: &str, question: &str, context: &PromptContext) -> Prompt {
    let question = question.trim();
    let mut user = format!("ВОПРОС: {question}\n");

    if let Some(website) = context.website.as_deref().filter(|w| !w.trim().is_empty()) {
        user.push('\n');
        user.push_str(website.trim());
        user.push('\n');
    }

    if let Some(service) = &context.service {
        user.push_str("\nКонтекст об услуге:\n");
        push_fact(&mut user, "Название", Some(service.name.as_str()));
        push_fact(&mut user, "Описание", service.description.as_deref());
        push_fact(&mut user, "Показания", service.indications.as_deref());
        push_fact(&mut user, "Методики", service.methods.as_deref());
        push_fact(&mut user, "Длительность", service.duration.as_deref());
        push_fact(&mut user, "Реабилитация", service.recovery.as_deref());
        push_fact(&mut user, "Цены", service.price_range.as_deref());
    }

    let skip = context.history.len().saturating_sub(HISTORY_TURNS);
    let recent = &context.history[skip..];
    if !recent.is_empty() {
        user.push_str("\nИстория диалога:\n");
        for turn in recent {
            let speaker = match turn.role {
                Role::User => "Клиент",
                Role::Assistant => "Анна",
            };
            user.push_str(&format!("{speaker}: {}\n", clip(turn.text.trim(), MAX_TURN_CHARS)));
        }
    }

    user.push_str(&format!("\nОТВЕТЬ НА ЭТОТ ВОПРОС: \"{question}\"\n"));

    Prompt {
        system: system_prompt(clinic_name),
        user,
    }
}
