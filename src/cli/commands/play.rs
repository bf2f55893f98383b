//! `play` command
//!
//! One game in the terminal, driven line by line through the same session
//! store the HTTP server uses.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::backend::Credential;
use crate::cli::args::PlayArgs;
use crate::error::{GameError, ImpostorError};
use crate::game::phase::Phase;
use crate::game::session::{Role, SessionId};
use crate::game::store::SessionStore;
use crate::observability::events::EventEmitter;
use crate::persona::PersonaId;

use super::{build_store, load_config, open_events};

const HELP: &str = "\
Commands:
  ask <color> <question>   question a crewmate (or just: <color> <question>)
  accuse                   stop questioning and name the impostor
  back                     return to questioning (once)
  guess <color>            name the impostor (ends the game)
  history <color>          show your conversation with a crewmate
  status                   show the game state
  help                     show this help
  quit                     leave the game";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayCommand {
    /// Question a persona
    Ask {
        /// Who
        persona: PersonaId,
        /// What
        question: String,
    },
    /// Enter the accusation phase
    Accuse,
    /// Leave the accusation phase
    Back,
    /// Name the impostor
    Guess(PersonaId),
    /// Show a conversation log
    History(PersonaId),
    /// Show the game state
    Status,
    /// Show the command list
    Help,
    /// Leave
    Quit,
}

enum Flow {
    Continue,
    Finished,
}

/// Play one game on stdin/stdout.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the game cannot be
/// created, or the terminal cannot be read or written.
pub async fn run(args: &PlayArgs, cancel: CancellationToken) -> Result<(), ImpostorError> {
    let config = load_config(&args.config, |_| {})?;
    let events = open_events(args.config.events_file.as_deref(), EventEmitter::noop)?;
    let store = build_store(&config, args.config.backend, events);

    println!("Generating the backstory. This can take a minute...");
    let snapshot = store.create(Credential::default()).await?;
    let id = snapshot.session_id;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    let outcome = tokio::select! {
        r = play_session(&store, id, stdin, &mut stdout) => r,
        () = cancel.cancelled() => Ok(()),
    };
    store.destroy(id).await;
    outcome
}

/// Runs the command loop for session `id` until a guess, `quit`, or EOF.
///
/// # Errors
///
/// Returns an I/O error if reading input or writing output fails, or a
/// game error if the session disappears.
pub async fn play_session<R, W>(
    store: &SessionStore,
    id: SessionId,
    reader: R,
    out: &mut W,
) -> Result<(), ImpostorError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let snapshot = store.snapshot(id).await?;
    writeln!(
        out,
        "A body was found aboard the ship. One of the four crewmates is the impostor.\n\
         Crewmates: {}. You have {} questions.\n\n{HELP}",
        color_list(&snapshot.personas),
        snapshot.questions_remaining
    )?;
    prompt(out)?;

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if let Flow::Finished = execute(store, id, command, out).await? {
                    return Ok(());
                }
            }
            Err(message) => writeln!(out, "{message}")?,
        }
        prompt(out)?;
    }
    writeln!(out)?;
    Ok(())
}

fn prompt<W: Write>(out: &mut W) -> std::io::Result<()> {
    write!(out, "> ")?;
    out.flush()
}

fn color_list(personas: &[PersonaId]) -> String {
    personas
        .iter()
        .map(|p| p.color())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn execute<W: Write>(
    store: &SessionStore,
    id: SessionId,
    command: PlayCommand,
    out: &mut W,
) -> Result<Flow, ImpostorError> {
    let result = match command {
        PlayCommand::Ask { persona, question } => {
            match store.ask(id, persona, &question).await {
                Ok(exchange) => {
                    writeln!(out, "{persona}: {}", exchange.reply.content)?;
                    writeln!(out, "[{} questions left]", exchange.questions_remaining)?;
                    if exchange.phase == Phase::Accusing {
                        writeln!(out, "Out of questions. Name the impostor with: guess <color>")?;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        PlayCommand::Accuse => match store.accuse(id).await {
            Ok(snapshot) => {
                writeln!(out, "Accusation phase. Name the impostor with: guess <color>")?;
                if snapshot.back_available && snapshot.questions_remaining > 0 {
                    writeln!(out, "(type 'back' to return to questioning, once)")?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        PlayCommand::Back => match store.back(id).await {
            Ok(snapshot) => {
                writeln!(
                    out,
                    "Back to questioning. {} questions left.",
                    snapshot.questions_remaining
                )?;
                Ok(())
            }
            Err(e) => Err(e),
        },
        PlayCommand::Guess(persona) => match store.submit_guess(id, persona).await {
            Ok(verdict) => {
                writeln!(out, "{}", verdict.message)?;
                writeln!(out, "Game over.")?;
                return Ok(Flow::Finished);
            }
            Err(e) => Err(e),
        },
        PlayCommand::History(persona) => match store.history(id, persona).await {
            Ok(messages) if messages.is_empty() => {
                writeln!(out, "You have not spoken to {persona} yet.")?;
                Ok(())
            }
            Ok(messages) => {
                for m in messages {
                    let who = match m.role {
                        Role::User => "you",
                        Role::Assistant => persona.color(),
                    };
                    writeln!(out, "{who}: {}", m.content)?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        PlayCommand::Status => match store.snapshot(id).await {
            Ok(s) => {
                writeln!(
                    out,
                    "Phase: {}. Questions left: {}/{}.",
                    s.phase.as_str(),
                    s.questions_remaining,
                    s.question_budget
                )?;
                for (persona, count) in &s.message_counts {
                    writeln!(out, "  {persona}: {count} messages")?;
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        PlayCommand::Help => {
            writeln!(out, "{HELP}")?;
            Ok(())
        }
        PlayCommand::Quit => {
            writeln!(out, "Leaving the game.")?;
            return Ok(Flow::Finished);
        }
    };

    match result {
        Ok(()) => Ok(Flow::Continue),
        Err(e @ GameError::NotFound(_)) => Err(e.into()),
        Err(e) => {
            writeln!(out, "error: {e}")?;
            Ok(Flow::Continue)
        }
    }
}

/// Parses one input line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns a message for the player when the line is not a command.
pub fn parse_command(line: &str) -> Result<Option<PlayCommand>, String> {
    let tokens = shlex::split(line)
        .unwrap_or_else(|| line.split_whitespace().map(str::to_string).collect());
    let Some((head, rest)) = tokens.split_first() else {
        return Ok(None);
    };

    let persona_arg = |rest: &[String]| -> Result<PersonaId, String> {
        let raw = rest
            .first()
            .ok_or_else(|| format!("'{head}' needs a color"))?;
        raw.parse().map_err(|e: crate::persona::UnknownPersona| e.to_string())
    };
    let ask = |persona: PersonaId, words: &[String]| -> Result<Option<PlayCommand>, String> {
        if words.is_empty() {
            return Err(format!("what do you want to ask {persona}?"));
        }
        Ok(Some(PlayCommand::Ask {
            persona,
            question: words.join(" "),
        }))
    };

    match head.to_ascii_lowercase().as_str() {
        "ask" | "a" => {
            let persona = persona_arg(rest)?;
            ask(persona, &rest[1..])
        }
        "accuse" => Ok(Some(PlayCommand::Accuse)),
        "back" => Ok(Some(PlayCommand::Back)),
        "guess" | "vote" => persona_arg(rest).map(|p| Some(PlayCommand::Guess(p))),
        "history" | "log" => persona_arg(rest).map(|p| Some(PlayCommand::History(p))),
        "status" => Ok(Some(PlayCommand::Status)),
        "help" | "?" => Ok(Some(PlayCommand::Help)),
        "quit" | "exit" | "q" => Ok(Some(PlayCommand::Quit)),
        other => match other.parse::<PersonaId>() {
            Ok(persona) => ask(persona, rest),
            Err(_) => Err(format!("unknown command '{head}' (type 'help')")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::{Collaborators, ScriptedBackend};
    use crate::game::session::{ImpostorToken, SessionConfig};
    use crate::game::store::StoreSettings;
    use crate::game::verdict::{CORRECT_MESSAGE, VerdictResolver};

    fn store(budget: u32) -> SessionStore {
        SessionStore::new(
            Collaborators::scripted(Arc::new(ScriptedBackend::new())),
            VerdictResolver::local_only(),
            StoreSettings {
                session: SessionConfig {
                    question_budget: budget,
                    ..SessionConfig::default()
                },
                generation_timeout: Duration::from_secs(1),
                ..StoreSettings::default()
            },
            Arc::new(EventEmitter::noop()),
        )
    }

    async fn play(store: &SessionStore, impostor: PersonaId, input: &str) -> String {
        let id = store
            .create_with_impostor(Credential::default(), ImpostorToken::assigned(impostor))
            .await
            .unwrap()
            .session_id;
        let mut out = Vec::new();
        play_session(store, id, input.as_bytes(), &mut out)
            .await
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(
            parse_command("ask blue where were you?").unwrap(),
            Some(PlayCommand::Ask {
                persona: PersonaId::Blue,
                question: "where were you?".into()
            })
        );
        assert_eq!(
            parse_command("Red \"did you see anything\"").unwrap(),
            Some(PlayCommand::Ask {
                persona: PersonaId::Red,
                question: "did you see anything".into()
            })
        );
        assert_eq!(
            parse_command("guess green").unwrap(),
            Some(PlayCommand::Guess(PersonaId::Green))
        );
        assert_eq!(parse_command("QUIT").unwrap(), Some(PlayCommand::Quit));
    }

    #[test]
    fn unbalanced_quotes_fall_back_to_words() {
        assert_eq!(
            parse_command("ask yellow where'd you go").unwrap(),
            Some(PlayCommand::Ask {
                persona: PersonaId::Yellow,
                question: "where'd you go".into()
            })
        );
    }

    #[test]
    fn parse_errors_are_helpful() {
        assert!(parse_command("guess").unwrap_err().contains("needs a color"));
        assert!(parse_command("guess bleu").unwrap_err().contains("did you mean 'blue'"));
        assert!(parse_command("dance").unwrap_err().contains("unknown command"));
        assert!(parse_command("ask red").unwrap_err().contains("what do you want"));
    }

    #[tokio::test]
    async fn full_game_correct_guess() {
        let store = store(3);
        let out = play(
            &store,
            PersonaId::Yellow,
            "ask blue where were you?\nhistory blue\naccuse\nguess yellow\n",
        )
        .await;
        assert!(out.contains("blue: I'm Player3."));
        assert!(out.contains("[2 questions left]"));
        assert!(out.contains("you: where were you?"));
        assert!(out.contains("Accusation phase"));
        assert!(out.contains(CORRECT_MESSAGE));
        assert!(out.contains("Game over."));
    }

    #[tokio::test]
    async fn budget_exhaustion_forces_accusation() {
        let store = store(1);
        let out = play(
            &store,
            PersonaId::Red,
            "green hello\ngreen again?\nback\nguess blue\n",
        )
        .await;
        assert!(out.contains("[0 questions left]"));
        assert!(out.contains("Out of questions"));
        assert!(out.contains("error: "));
        assert!(out.contains("Wrong! The impostor was red."));
    }

    #[tokio::test]
    async fn eof_ends_quietly() {
        let store = store(2);
        let out = play(&store, PersonaId::Blue, "status\n").await;
        assert!(out.contains("Phase: playing. Questions left: 2/2."));
        assert!(!out.contains("Game over."));
    }
}
