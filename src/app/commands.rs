#[cfg(test)]
#[path = "commands_test.rs"]
mod tests;

use std::io::Write;

use eyre::{Context, Result, bail};

use crate::app::resolver::ConversationResolver;
use crate::models::{SessionContext, storage::FilterMessages};
use crate::storage::ArcStore;

/// Print the conversation the chat would continue, optionally narrowed to
/// the context's marketing plan.
pub async fn print_history(
    store: &ArcStore,
    context: &SessionContext,
    limit: usize,
    out: &mut impl Write,
) -> Result<()> {
    let Some(user_id) = context.user_id() else {
        bail!("a user id is required, use --user or set general.user_id");
    };

    let resolution = ConversationResolver::new(store.clone())
        .resolve(user_id, context.conversation_id(), None)
        .await?;

    let mut filter = FilterMessages::new(user_id).with_limit(limit);
    if let Some(conversation_id) = resolution.conversation_id() {
        filter = filter.with_conversation_id(conversation_id);
    }
    if let Some(plan_id) = context.marketing_plan_id() {
        filter = filter.with_marketing_plan_id(plan_id);
    }

    if filter.conversation_id().is_none() && filter.marketing_plan_id().is_none() {
        writeln!(out, "No conversation found for {}", user_id)?;
        return Ok(());
    }

    let messages = store
        .list_messages(filter)
        .await
        .wrap_err("listing messages")?;

    if let Some(conversation_id) = resolution.conversation_id() {
        writeln!(out, "# {} ({})", conversation_id, resolution.rule())?;
    }
    for message in messages {
        writeln!(
            out,
            "[{}] {}> {}",
            message.created_at().format("%Y-%m-%d %H:%M:%S"),
            message.role(),
            message.content()
        )?;
    }
    Ok(())
}

/// Delete the conversation the chat would continue.
pub async fn delete_conversation(
    store: &ArcStore,
    context: &SessionContext,
    out: &mut impl Write,
) -> Result<()> {
    let Some(user_id) = context.user_id() else {
        bail!("a user id is required, use --user or set general.user_id");
    };

    let resolution = ConversationResolver::new(store.clone())
        .resolve(user_id, context.conversation_id(), None)
        .await?;

    let Some(conversation_id) = resolution.conversation_id() else {
        writeln!(out, "No conversation found for {}", user_id)?;
        return Ok(());
    };

    let deleted = store
        .delete_conversation(user_id, conversation_id)
        .await
        .wrap_err_with(|| format!("deleting conversation {}", conversation_id))?;
    log::info!("Deleted {} turns of {}", deleted, conversation_id);
    writeln!(out, "Deleted {} messages of {}", deleted, conversation_id)?;
    Ok(())
}
