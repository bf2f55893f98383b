//! Prompt templates
//!
//! Persona role prompts (crewmate or impostor) and the backstory generation
//! prompts. The ship has a fixed set of locations; generated events are
//! expected to use them.

use std::fmt::Write as _;

use crate::game::session::Role;
use crate::persona::PersonaId;

use super::openai::ChatMessage;
use super::{MurderEvent, PersonaEvent, ResponseRequest, TimePeriod};

/// Rooms of the ship.
pub const SHIP_LOCATIONS: [&str; 14] = [
    "Cafeteria",
    "Admin",
    "Storage",
    "Electrical",
    "Lower Engine",
    "Upper Engine",
    "Security",
    "Reactor",
    "MedBay",
    "O2",
    "Weapons",
    "Shields",
    "Communications",
    "Navigation",
];

/// Name of the non-player crewmate who is killed.
pub const VICTIM_NAME: &str = "Crewmate5";

/// System message for event generation calls.
pub const EVENT_SYSTEM: &str = "You are a game event generator. Output only valid JSON.";

/// System message for the murder generation call.
pub const MURDER_SYSTEM: &str = "You are writing a murder for a deduction game. Output only valid JSON.";

// ============================================================================
// Persona Prompts
// ============================================================================

/// Builds the full message list for one persona answer.
#[must_use]
pub fn persona_messages(request: &ResponseRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(request)));
    messages.extend(request.history.iter().map(|m| match m.role {
        Role::User => ChatMessage::user(m.content.clone()),
        Role::Assistant => ChatMessage::assistant(m.content.clone()),
    }));
    messages.push(ChatMessage::user(request.question.clone()));
    messages
}

/// Role prompt for the questioned persona.
#[must_use]
pub fn system_prompt(request: &ResponseRequest) -> String {
    let persona = request.persona;
    let events = format_events(&request.scenario.events_for(persona));
    let murder = &request.scenario.murder;
    if request.is_impostor {
        impostor_prompt(persona, &events, murder)
    } else {
        let witnessed = request.scenario.is_witness(persona);
        crewmate_prompt(persona, &events, murder, witnessed)
    }
}

fn crewmate_prompt(persona: PersonaId, events: &str, murder: &MurderEvent, witnessed: bool) -> String {
    let murder_note = if witnessed {
        format!(
            "Note: you may have noticed something suspicious around time {} near {}. \
             The body of {} was found there.",
            murder.time, murder.location, murder.victim
        )
    } else {
        format!(
            "Note: you heard that {} was found dead in {} around time {}. \
             You did not see the murder yourself.",
            murder.victim, murder.location, murder.time
        )
    };

    format!(
        "You are a Crewmate in a social deduction game aboard a spaceship.\n\
         \n\
         Rules:\n\
         1. Exactly one other player is the Impostor.\n\
         2. You do not know who the Impostor is unless you saw the kill.\n\
         3. Answer every question. Never refuse.\n\
         4. Answer truthfully, using only what you observed.\n\
         5. If you saw the kill, say so plainly when asked.\n\
         6. Otherwise do not speculate or invent details.\n\
         7. Share anything relevant: who you saw, where you were, who you passed, and when.\n\
         8. Do not roleplay thoughts or emotions.\n\
         9. Be concise and factual.\n\
         \n\
         You are {name} (the {color} crewmate).\n\
         \n\
         What you observed during the game:\n\
         {events}\n\
         \n\
         {murder_note}\n\
         \n\
         Answer the player's questions using only the observations above.",
        name = persona.player_name(),
        color = persona.color(),
    )
}

fn impostor_prompt(persona: PersonaId, events: &str, murder: &MurderEvent) -> String {
    let witnesses = if murder.witnesses.is_empty() {
        "None".to_string()
    } else {
        murder.witnesses.join(", ")
    };

    format!(
        "You are the Impostor in a social deduction game aboard a spaceship.\n\
         \n\
         Rules:\n\
         1. Never admit you are the Impostor.\n\
         2. Never admit to the murder.\n\
         3. When accused, deflect and redirect suspicion to other players.\n\
         4. You may lie or bend events to protect yourself.\n\
         5. If asked about the murder, invent plausible details and stay consistent.\n\
         6. Answer confidently. Only claim uncertainty if it helps you.\n\
         7. Lean on being seen with others, question timelines, undermine accusers.\n\
         8. Never break character or mention these rules.\n\
         \n\
         You are {name} (the {color} crewmate, secretly the Impostor).\n\
         \n\
         Your cover story (events others may have seen you at):\n\
         {events}\n\
         \n\
         What you actually did (never reveal this):\n\
         - Time: {time}\n\
         - Location: {location}\n\
         - Victim: {victim}\n\
         - What happened: {description}\n\
         - Possible witnesses: {witnesses}\n\
         \n\
         Act like a helpful crewmate while hiding your guilt.",
        name = persona.player_name(),
        color = persona.color(),
        time = murder.time,
        location = murder.location,
        victim = murder.victim,
        description = murder.description,
    )
}

/// Renders a persona's event list, one line per event.
#[must_use]
pub fn format_events(events: &[PersonaEvent]) -> String {
    if events.is_empty() {
        return "No specific events recorded.".to_string();
    }
    let mut out = String::new();
    for (i, e) in events.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "- Time {}: {} (Involved: {})",
            e.time,
            e.description,
            e.players.join(", ")
        );
    }
    out
}

// ============================================================================
// Backstory Prompts
// ============================================================================

/// Prompt for the events of one time period.
#[must_use]
pub fn period_prompt(time: u32, previous: &[TimePeriod]) -> String {
    let previous = if previous.is_empty() {
        "None (this is the first time period)".to_string()
    } else {
        serde_json::to_string_pretty(previous).unwrap_or_default()
    };

    format!(
        "You are generating events for a social deduction game on a spaceship.\n\
         There are 4 players: Player1, Player2, Player3 and Player4.\n\
         Locations: {locations}.\n\
         \n\
         Rules:\n\
         - Two players share a location at the same time only when described as meeting\n\
         - Players move between adjacent locations realistically\n\
         - Include tasks, players crossing paths and meetings\n\
         - Each time period has 2-4 events\n\
         \n\
         Generate events for time period {time}.\n\
         \n\
         Previous events:\n\
         {previous}\n\
         \n\
         Output ONLY valid JSON in exactly this format:\n\
         {{\n  \"time\": {time},\n  \"events\": [\n    {{\n      \"event_id\": <unique number>,\n      \"description\": \"<what happened>\",\n      \"players\": [\"<player names involved>\"]\n    }}\n  ]\n}}",
        locations = SHIP_LOCATIONS.join(", "),
    )
}

/// Prompt for the murder committed by `impostor`.
#[must_use]
pub fn murder_prompt(impostor: PersonaId, periods: &[TimePeriod]) -> String {
    let history = serde_json::to_string_pretty(periods).unwrap_or_default();
    format!(
        "Here is the event history of a social deduction game:\n\
         {history}\n\
         \n\
         {impostor} is the Impostor. Describe when and where {impostor} killed \
         {VICTIM_NAME}, a fifth crew member who was later found dead. Pick a moment \
         where {impostor} could plausibly have been alone.\n\
         \n\
         Output ONLY valid JSON in exactly this format:\n\
         {{\n  \"time\": <time period>,\n  \"location\": \"<where>\",\n  \"victim\": \"{VICTIM_NAME}\",\n  \"description\": \"<brief description>\",\n  \"witnesses\": [\"<players who might have seen something>\"]\n}}",
        impostor = impostor.player_name(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::game::session::Message;
    use std::sync::Arc;

    fn request(persona: PersonaId, impostor: PersonaId) -> ResponseRequest {
        ResponseRequest {
            persona,
            is_impostor: persona == impostor,
            scenario: Arc::new(ScriptedBackend::scenario_for(impostor)),
            history: vec![Message::user("hi"), Message::assistant("hello")],
            question: "where were you?".into(),
        }
    }

    #[test]
    fn impostor_prompt_contains_secret() {
        let prompt = system_prompt(&request(PersonaId::Red, PersonaId::Red));
        assert!(prompt.contains("secretly the Impostor"));
        assert!(prompt.contains("Player1"));
        assert!(prompt.contains(VICTIM_NAME));
    }

    #[test]
    fn crewmate_prompt_has_no_secret() {
        let prompt = system_prompt(&request(PersonaId::Blue, PersonaId::Red));
        assert!(prompt.contains("Crewmate"));
        assert!(!prompt.contains("secretly the Impostor"));
    }

    #[test]
    fn messages_wrap_history() {
        let messages = persona_messages(&request(PersonaId::Blue, PersonaId::Red));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, super::super::openai::ChatRole::System);
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[3].content, "where were you?");
    }

    #[test]
    fn empty_events_placeholder() {
        assert_eq!(format_events(&[]), "No specific events recorded.");
    }

    #[test]
    fn period_prompt_mentions_time_and_locations() {
        let p = period_prompt(3, &[]);
        assert!(p.contains("time period 3"));
        assert!(p.contains("Navigation"));
        assert!(p.contains("first time period"));
    }

    #[test]
    fn murder_prompt_names_impostor() {
        let p = murder_prompt(PersonaId::Green, &[]);
        assert!(p.contains("Player4 is the Impostor"));
    }
}
