//! Story acts, their prompt, and one narration turn

use serde::{Deserialize, Serialize};
use log::{debug, info};
use crate::extract::{parse_story, StoryTurn};
use crate::providers::CompletionProvider;

// ===== World Data =====

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig
{   pub description: String
  , pub governance: Vec<String>
  , pub conflicts: Vec<String>
  , pub advisor_role: String
}

impl Default for WorldConfig
{   fn default() -> Self
    {   WorldConfig
        {   description: "A future world where most public decisions are \
              made by intelligent systems instead of humans. These systems \
              manage laws, security and resource allocation mainly focusing \
              on profits".to_string()
          , governance: vec![
              "Automated decision councils".to_string()
            , "Data driven law enforcements".to_string()
            ]
          , conflicts: vec![
              "People do not understand or question decisions that \
                affect them".to_string()
            , "Systems slowly prioritize efficiency over fairness"
                .to_string()
            ]
          , advisor_role: "An advisory intelligence designed to guide \
              decisions ethically, without taking final decisions"
              .to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterData
{   pub factions: Vec<String>
  , pub advisor: Option<String>
  , pub themes: Vec<String>
}

impl Default for CharacterData
{   fn default() -> Self
    {   CharacterData
        {   factions: vec![
              "People who design fair AI systems".to_string()
            , "Dominant Autonomous Networks".to_string()
            , "Human groups trying to stay involved".to_string()
            ]
          , advisor: Some(
              "An advisory system that guides decisions but does not \
                control them".to_string()
            )
          , themes: vec![
              "Taking responsibility for decisions".to_string()
            , "Who should be in control - humans or machines".to_string()
            , "Transparency".to_string()
            ]
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character
{   pub name: String
  , pub role: String
  , pub description: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Act
{   pub name: String
  , pub description: String
  , pub characters: Vec<Character>
  , pub world: WorldConfig
}

/// Every faction becomes a character, then the advisor
pub fn build_act_specification(
  characters: &CharacterData
, world: &WorldConfig
, act_name: &str
) -> Act
{   let mut cast: Vec<Character> = characters.factions
      .iter()
      .map(|f| Character
        {   name: f.clone()
          , role: "Faction".to_string()
          , description: f.clone()
        })
      .collect();

    if let Some(advisor) = characters.advisor
      .as_ref()
      .filter(|a| !a.is_empty())
    {   cast.push(Character
        {   name: "Advisor".to_string()
          , role: "Advisor".to_string()
          , description: advisor.clone()
        });
    }

    Act
    {   name: act_name.to_string()
      , description: format!(
          "A story act exploring {} in the defined world.",
          act_name
        )
      , characters: cast
      , world: world.clone()
    }
}

// ===== Prompt =====

/// One "write the next chapter" request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRequest
{   pub act_name: String
  , /// Replaces the configured world description
    pub world_description: Option<String>
  , pub previous_context: Option<String>
  , /// The option the player picked last turn
    pub choice: Option<String>
}

impl StoryRequest
{   /// Earlier story plus the player's choice; only when both exist
    pub fn continuation(&self) -> Option<String>
    {   match (&self.previous_context, &self.choice)
        {   (Some(previous), Some(choice))
              if !previous.is_empty() && !choice.is_empty() => {
              Some(format!(
                "{}\n\nUSER CHOICE SELECTED: {}",
                previous, choice
              ))
            }
          , _ => None
        }
    }
}

pub fn build_story_prompt(act: &Act, previous_context: Option<&str>)
  -> String
{   let characters: Vec<String> = act.characters
      .iter()
      .map(|c| format!("- {}: {}", c.name, c.description))
      .collect();

    let continuation = match previous_context
    {   Some(previous) => format!(
"**PREVIOUS STORY CONTEXT:**
{}

**INSTRUCTION:**
Continue the story from the above context.
", previous)
      , None => String::new()
    };

    format!(
"Write a story act titled \"{name}\".

**The World:**
{world}
Governance: {governance}

**The Characters/Factions:**
{characters}

{continuation}
**Instructions:**
Write a compelling narrative that explores the conflict between efficiency \
and ethics.
The story should be set in this futuristic world.

**IMPORTANT: FORMATTING**
At the end of your story, you MUST provide:
1. An image generation prompt that describes the key scene of this chapter \
visually.
2. A \"State Update\" for the player's RPG stats:
    - **dharma**: An integer from -100 (Adharma/Chaos) to +100 \
(Dharma/Order). Based on the user's last choice.
    - **karma**: An integer representing accumulated consequences \
(starts at 0).
    - **inventory**: A list of items/abilities the player currently has \
(e.g. \"Data-Astra\", \"Royal Signet\").
3. 3 distinct choices for the reader to decide what happens next.

These must be formatted as a JSON block at the very end of your response.

Example format:
```json
{{
    \"image_prompt\": \"A cybernetic warrior standing on a neon-lit rooftop...\",
    \"dharma\": 10,
    \"karma\": 5,
    \"inventory\": [\"Plasma Katana\", \"Council Access Code\"],
    \"choices\": [
        \"Choice 1: Rachel decides to shutdown the AI.\",
        \"Choice 2: Rachel tries to negotiate with the Council.\",
        \"Choice 3: Rachel flees the city to find the resistance.\"
    ]
}}
```
"
    , name = act.name
    , world = act.world.description
    , governance = act.world.governance.join(", ")
    , characters = characters.join("\n")
    , continuation = continuation
    )
}

// ===== Narration =====

/// Generate and split one chapter.
///
/// Only provider failure is an error; a chapter without a state
/// block comes back with `state: None`.
pub async fn narrate(
  provider: &dyn CompletionProvider
, request: &StoryRequest
, world: &WorldConfig
, characters: &CharacterData
) -> crate::Result<StoryTurn>
{   let mut world = world.clone();
    if let Some(description) = &request.world_description
    {   world.description = description.clone();
    }

    let act = build_act_specification(
      characters
    , &world
    , &request.act_name
    );
    let continuation = request.continuation();
    let prompt = build_story_prompt(&act, continuation.as_deref());
    debug!("Story prompt of {} bytes for {}", prompt.len(), act.name);

    let raw = provider.generate(&prompt).await?;
    let turn = parse_story(&raw);
    info!(
      "Act '{}' narrated, state update: {}",
      act.name,
      turn.state.is_some()
    );
    Ok(turn)
}
