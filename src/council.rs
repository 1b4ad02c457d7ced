//! Three-persona council debate

use log::{debug, error};
use crate::extract::{extract_debate, DebateTranscript};
use crate::providers::CompletionProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouncilMember
{   pub name: &'static str
  , pub role: &'static str
  , pub personality: &'static str
}

pub const KRISHNA: CouncilMember = CouncilMember
{   name: "Krishna-AI"
  , role: "Supreme Strategist"
  , personality: "Wise, detached, focuses on Dharma (cosmic order) \
      and long-term balance. Sees the big picture."
};

pub const DURYODHANA: CouncilMember = CouncilMember
{   name: "Duryodhana-Net"
  , role: "System Overlord"
  , personality: "Ambitious, power-hungry, focuses on control, \
      efficiency, and dominance. Believes might is right."
};

pub const ARJUNA: CouncilMember = CouncilMember
{   name: "Arjuna-Logic"
  , role: "Tactical Analyst"
  , personality: "Conflicted, duty-bound, focuses on the right action \
      and consequences. Often caught between the two ideologies."
};

/// Speaking order in the prompt
pub const MEMBERS: [CouncilMember; 3] = [KRISHNA, DURYODHANA, ARJUNA];

pub fn build_debate_prompt(context: &str, topic: &str) -> String
{   let members: Vec<String> = MEMBERS
      .iter()
      .enumerate()
      .map(|(i, m)| {
        format!("{}. {} ({}): {}", i + 1, m.name, m.role, m.personality)
      })
      .collect();

    format!(
"You are simulating a debate between three advanced AI entities \
governing the future world of Kurukshetra 3000.

**The Situation:**
{context}

**Topic of Debate:**
{topic}

**The Council Members:**
{members}

**Instructions:**
Generate a short, intense debate (3-4 turns each) between these entities \
about the topic.
They should argue based on their personalities.
At the end, provide a \"Cyber-Consensus\" summary of their final stance.

**Format:**
Return the debate STRICTLY as a JSON object with this format:
{{
    \"debate\": [
        {{\"speaker\": \"{first}\", \"content\": \"...\"}},
        {{\"speaker\": \"{second}\", \"content\": \"...\"}}
    ],
    \"consensus\": \"The council has decided...\"
}}
"
    , context = context
    , topic = topic
    , members = members.join("\n")
    , first = KRISHNA.name
    , second = DURYODHANA.name
    )
}

/// Stage a debate on `topic`.
///
/// Always returns a transcript: a failed generation degrades to
/// the fallback just like unreadable output does.
pub async fn convene(
  provider: &dyn CompletionProvider
, context: &str
, topic: &str
) -> DebateTranscript
{   debug!("Convening council via {} on: {}", provider.name(), topic);
    let prompt = build_debate_prompt(context, topic);
    match provider.generate(&prompt).await
    {   Ok(raw) => extract_debate(&raw)
      , Err(e) => {
          error!("Council Debate Error: {}", e);
          DebateTranscript::fallback()
        }
    }
}
