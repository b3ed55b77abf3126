// File: voxbot-core/src/services/discord/slashcommands/ping.rs

use std::sync::Arc;
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::command::CommandType,
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::marker::{ApplicationMarker, InteractionMarker},
    id::Id,
};
use twilight_util::builder::command::CommandBuilder;

use crate::services::discord::commands::PING_REPLY;
use crate::Error;

/// `/ping`, usable in DMs as well.
pub fn create_ping_command() -> CommandBuilder {
    CommandBuilder::new("ping", "Replies with 'pong'", CommandType::ChatInput).dm_permission(true)
}

pub fn ping_response() -> InteractionResponse {
    InteractionResponse {
        kind: InteractionResponseType::ChannelMessageWithSource,
        data: Some(InteractionResponseData {
            content: Some(PING_REPLY.into()),
            ..Default::default()
        }),
    }
}

pub async fn handle_ping_interaction(
    http: &Arc<HttpClient>,
    application_id: Id<ApplicationMarker>,
    interaction_id: Id<InteractionMarker>,
    interaction_token: &str,
) -> Result<(), Error> {
    http.interaction(application_id)
        .create_response(interaction_id, interaction_token, &ping_response())
        .await
        .map_err(|e| Error::Platform(format!("Error responding to `/ping`: {e}")))?;

    Ok(())
}
