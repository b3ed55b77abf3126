// File: voxbot-core/src/services/discord/slashcommands/mod.rs

pub mod ping;

use std::sync::Arc;
use tracing::{debug, warn};
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::interaction::InteractionData,
    gateway::payload::incoming::InteractionCreate,
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::marker::ApplicationMarker,
    id::Id,
};

use crate::services::discord::slashcommands::ping::{create_ping_command, handle_ping_interaction};
use crate::Error;

pub async fn register_global_slash_commands(
    http: &Arc<HttpClient>,
    application_id: Id<ApplicationMarker>,
) -> Result<(), Error> {
    let commands = &[create_ping_command().build()];

    http.interaction(application_id)
        .set_global_commands(commands)
        .await
        .map_err(|e| Error::Platform(format!("Failed to register global slash commands: {e}")))?;

    debug!("Registered {} global slash command(s)", commands.len());
    Ok(())
}

/// Dispatch slash commands from an `InteractionCreate`.
pub async fn handle_interaction_create(
    http: Arc<HttpClient>,
    event: &InteractionCreate,
) -> Result<(), Error> {
    let interaction = &event.0;
    let application_id = interaction.application_id;
    let interaction_id = interaction.id;
    let interaction_token = &interaction.token;

    let Some(InteractionData::ApplicationCommand(cmd_data)) = &interaction.data else {
        return Ok(());
    };

    match cmd_data.name.as_str() {
        "ping" => {
            handle_ping_interaction(&http, application_id, interaction_id, interaction_token).await?;
        }
        other => {
            warn!("Unrecognized slash command /{other}");
            let response = InteractionResponse {
                kind: InteractionResponseType::ChannelMessageWithSource,
                data: Some(InteractionResponseData {
                    content: Some(format!("Unrecognized command: {other}")),
                    ..Default::default()
                }),
            };
            if let Err(e) = http
                .interaction(application_id)
                .create_response(interaction_id, interaction_token, &response)
                .await
            {
                debug!("Failed to answer unrecognized /{other}: {e}");
            }
        }
    }

    Ok(())
}
