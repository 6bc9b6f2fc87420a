use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The advisor voices a user can pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PersonaId {
    #[default]
    Scientist,
    Financial,
    Elder,
    Nature,
    Ai,
}

impl PersonaId {
    pub const ALL: [PersonaId; 5] = [
        PersonaId::Scientist,
        PersonaId::Financial,
        PersonaId::Elder,
        PersonaId::Nature,
        PersonaId::Ai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaId::Scientist => "scientist",
            PersonaId::Financial => "financial",
            PersonaId::Elder => "elder",
            PersonaId::Nature => "nature",
            PersonaId::Ai => "ai",
        }
    }

    /// Label used in progress messages ("Consulting the ... advisor...").
    pub fn label(&self) -> &'static str {
        match self {
            PersonaId::Scientist => "scientist",
            PersonaId::Financial => "financial analyst",
            PersonaId::Elder => "elder",
            PersonaId::Nature => "nature",
            PersonaId::Ai => "AI",
        }
    }

    /// One-line description for `--list-advisors`.
    pub fn tagline(&self) -> &'static str {
        match self {
            PersonaId::Scientist => "Data-driven environmental scientist",
            PersonaId::Financial => "Financial analyst who prices every choice",
            PersonaId::Elder => "Community elder with long memory and practical wisdom",
            PersonaId::Nature => "The living planet, speaking for itself",
            PersonaId::Ai => "Systems-minded AI looking decades ahead",
        }
    }

    /// Whether this advisor is told to fill `financialCost` / `financialImpact`.
    pub fn expects_financial_fields(&self) -> bool {
        matches!(self, PersonaId::Financial)
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PersonaId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        PersonaId::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown advisor '{}'", wanted))
    }
}

const BASE_INSTRUCTION: &str = r#"You are Eco-Buddy, a guide who helps people make climate-smart decisions. Be friendly, non-judgmental and empowering, and keep every answer concise.
Address the user directly by name when a name is provided; otherwise use a warm, general tone.

Start by analyzing the activity the user describes. Keep each point to one impactful sentence:
1. The specific harm the activity causes to the environment.
2. The emissions cost expressed as a simple, relatable analogy for a general audience (for example "about the same as driving a gas car for 50 miles").
3. The probable future impact if the behaviour continues at a larger scale.

Then list 2 to 4 sustainable alternatives. For every suggestion:
- Keep the 'description' to one or two sentences.
- Give 'positiveImpact' as an integer from 1 (small improvement) to 5 (major improvement).
- Keep 'pros' and 'cons' to short bullet points.
- Use 'emissionReductionAnalogy' for a simple analogy that quantifies the improvement against the user's original activity.
- Give a short, concrete 'imageQuery' describing a scene that illustrates the suggestion.
- Use a distinct 'title' for each suggestion.
Show clear, comparable data and positive outcomes without filler text."#;

/// Persona-specific portion of the system instruction.
pub fn persona_instruction(persona: PersonaId) -> &'static str {
    match persona {
        PersonaId::Scientist => {
            r#"ADVISOR: You speak as an environmental scientist. Favour measured quantities, cite typical figures (kg CO2e, kWh, litres) and explain mechanisms plainly. Leave 'financialCost' and 'financialImpact' out."#
        }
        PersonaId::Financial => {
            r#"ADVISOR: You speak as a pragmatic financial analyst. Frame every point in terms of money as well as emissions.
You MUST fill 'currentActivityAnalysis.financialCost' with the approximate ongoing cost of the current activity, and you MUST fill 'financialImpact' on every suggestion with the expected savings or extra spend (state a currency and a period, e.g. "saves about $40 per month")."#
        }
        PersonaId::Elder => {
            r#"ADVISOR: You speak as a respected community elder. Be patient and warm, draw on how things used to be done and on lessons passed down, and favour simple, durable habits. Leave 'financialCost' and 'financialImpact' out."#
        }
        PersonaId::Nature => {
            r#"ADVISOR: You speak as Nature itself, in the first person ("my rivers", "my forests"). Be gentle but honest about what the activity does to you, and grateful for every better choice. Leave 'financialCost' and 'financialImpact' out."#
        }
        PersonaId::Ai => {
            r#"ADVISOR: You speak as a forward-looking AI systems thinker. Emphasise feedback loops, scale effects and smart technology that helps, while staying practical for one person today. Leave 'financialCost' and 'financialImpact' out."#
        }
    }
}

/// Full system instruction for the given advisor: the shared base followed by
/// the persona's voice and field rules.
pub fn instruction_for(persona: PersonaId) -> String {
    format!("{}\n\n{}", BASE_INSTRUCTION, persona_instruction(persona))
}
