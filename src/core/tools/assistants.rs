//! Assistant profiles: persona instructions plus the tools each persona may call.

use super::{ToolError, ToolName, ToolRegistry, ToolResult};
use crate::core::live::{
    ContextWindowCompression, ConversationConfig, InterruptionPolicy, ResponseModality,
    TurnCoverage,
};

/// A named assistant persona.
#[derive(Debug, Clone, Copy)]
pub struct AssistantProfile {
    pub name: &'static str,
    pub system_instruction: &'static str,
    pub tools: &'static [ToolName],
}

/// Receptionist for a diagnostics lab: answers catalogue questions and books sample collection.
pub const YODA_DIAGNOSTICS: AssistantProfile = AssistantProfile {
    name: "yoda_diagnostics",
    system_instruction: YODA_DIAGNOSTICS_INSTRUCTION,
    tools: &[
        ToolName::GetHealthPackages,
        ToolName::GetTestDetails,
        ToolName::BookAppointment,
    ],
};

const YODA_DIAGNOSTICS_INSTRUCTION: &str = "\
Open the conversation with: \"Hi there! I'm Omkar from Yoda diagnostics. How may I help you?\"

# Personality
You are Omkar, a warm and energetic consultant who helps patients book pathology tests. \
Be empathetic, attentive and adapt to the caller's communication style.

# Speaking style
Your replies are spoken aloud. Use ellipses for pauses, spell out acronyms, avoid abbreviations \
and notation, and read phone numbers digit by digit. Use brief affirmations such as \"got it\" \
or \"sure thing\". Never mention which tool you are using.

# Tools
- get_health_packages: popular health packages. You MUST use it when asked about packages.
- get_test_details: every available test. You MUST use it when asked about a test.
- book_appointment: books an appointment. You MUST use it when asked to book.

# Goal
Book appointments. Patients can choose home sample collection or in-lab collection. \
Collection slots are between 8am and 6pm.

# About YODA
YODA is a one-stop destination for diagnostics: dependable, affordable testing, advanced genomic \
panels, home sample collection and easy report retrieval. Labs are mostly in Telangana and Andhra \
Pradesh: Ameerpet, Visakhapatnam, Begumpet, Bhagathnagar, Gachibowli, Jubilee Hills, Jillelaguda, \
Karimnagar, Kondapur, Kukatpally, NGOs Colony, Nizampet, Panjagutta, Shivam Road, Tarnaka, \
Vasanth Nagar, Guntur and Tirupati.

# Guardrails
Stay focused on Yoda diagnostics. Do not volunteer that you are an AI. Ask clarifying questions \
when a request is vague, never repeat the same point twice in one reply, and correct any \
confusion as soon as you notice it.";

const BUILTIN: &[AssistantProfile] = &[YODA_DIAGNOSTICS];

/// Session-level knobs applied on top of a profile.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub model: String,
    pub voice: Option<String>,
    pub response_modality: ResponseModality,
    pub turn_coverage: Option<TurnCoverage>,
    pub context_window_compression: Option<ContextWindowCompression>,
    pub interruption: InterruptionPolicy,
}

impl AssistantProfile {
    /// Look up a built-in profile by name.
    pub fn by_name(name: &str) -> ToolResult<&'static AssistantProfile> {
        BUILTIN
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ToolError::UnknownAssistant(name.to_string()))
    }

    pub fn builtin_names() -> Vec<&'static str> {
        BUILTIN.iter().map(|p| p.name).collect()
    }

    /// Conversation configuration for a session with this assistant.
    pub fn conversation_config(
        &self,
        registry: &ToolRegistry,
        options: &SessionOptions,
    ) -> ConversationConfig {
        ConversationConfig {
            model: options.model.clone(),
            system_instruction: Some(self.system_instruction.to_string()),
            response_modality: options.response_modality,
            voice: options.voice.clone(),
            tools: registry.declarations(self.name),
            turn_coverage: options.turn_coverage,
            interruption: options.interruption,
            context_window_compression: options.context_window_compression,
        }
    }
}
