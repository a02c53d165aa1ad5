use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::api::AppState;
use crate::chat::RelayError;
use crate::core::AppConfig;

pub async fn run(session_id: &str, config: AppConfig) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    // Same relay the server uses so history ends up in the same place
    let AppState { relay, config } = AppState::from_config(config);

    let history = relay.store().load(session_id).await?;
    println!(
        "Session {} ({} messages). Type {} to snapshot, Ctrl-D to quit.",
        session_id,
        history.len(),
        config.save_command
    );

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());
                match relay.chat(session_id, Some(&line), None).await {
                    Ok(reply) => println!("{}", reply),
                    // Keep the REPL alive when the model call fails
                    Err(RelayError::Remote(e)) => println!("Error: {}", e),
                    Err(e) => return Err(e.into()),
                }
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}
