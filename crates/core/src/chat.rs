use tracing::debug;

use crate::completion::{ChatModel, PromptMessage};
use crate::context::ContextAssembler;
use crate::db::{trailing_window, ChatRepository, RECENT_MESSAGE_WINDOW};
use crate::embeddings::Embedder;
use crate::error::ChatError;
use crate::models::{ChatMessage, MessageRole};
use crate::traits::VectorIndex;

/// Drives one conversation turn: persist the user message, assemble
/// retrieval context from that message alone, prompt the model with the
/// context block plus the trailing conversation window, persist the reply.
///
/// The user message is stored before anything fallible runs against hosted
/// services, so a failed turn leaves it in place with no paired reply.
pub struct ChatService<R, E, V, M> {
    repository: R,
    context: ContextAssembler<E, V>,
    model: M,
}

impl<R, E, V, M> ChatService<R, E, V, M>
where
    R: ChatRepository,
    E: Embedder,
    V: VectorIndex,
    M: ChatModel,
{
    pub fn new(repository: R, context: ContextAssembler<E, V>, model: M) -> Self {
        Self {
            repository,
            context,
            model,
        }
    }

    pub async fn respond(
        &self,
        user_id: &str,
        chat_id: i64,
        message: &str,
    ) -> Result<ChatMessage, ChatError> {
        if user_id.trim().is_empty() {
            return Err(ChatError::Unauthorized);
        }
        if message.trim().is_empty() {
            return Err(ChatError::Validation("message is empty".to_string()));
        }

        let chat = self
            .repository
            .chat_by_id(chat_id)
            .await?
            .ok_or(ChatError::ChatNotFound(chat_id))?;
        if chat.user_id != user_id {
            return Err(ChatError::Unauthorized);
        }

        let history = self.repository.messages_for_chat(chat_id).await?;
        self.repository
            .insert_message(chat_id, MessageRole::User, message)
            .await?;

        // Retrieval uses the latest message only; prior turns do not enrich
        // the query.
        let context = self.context.get_context(message, &chat.file_key).await?;
        debug!(chat_id, context_chars = context.chars().count(), "context assembled");

        let prompt = build_prompt(&context, &history, message);
        let reply = self.model.complete(&prompt).await?;

        let stored = self
            .repository
            .insert_message(chat_id, MessageRole::System, &reply)
            .await?;
        Ok(stored)
    }
}

/// System instructions, the trailing conversation window, then the current
/// question.
pub fn build_prompt(
    context: &str,
    history: &[ChatMessage],
    question: &str,
) -> Vec<PromptMessage> {
    let recent = trailing_window(history, RECENT_MESSAGE_WINDOW);

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(PromptMessage::system(system_prompt(context)));
    for message in recent {
        messages.push(match message.role {
            MessageRole::User => PromptMessage::user(message.content.clone()),
            MessageRole::System => PromptMessage::assistant(message.content.clone()),
        });
    }
    messages.push(PromptMessage::user(question.to_string()));
    messages
}

fn system_prompt(context: &str) -> String {
    format!(
        "You are an assistant answering questions about a document the user uploaded.\n\
         START CONTEXT BLOCK\n\
         {context}\n\
         END OF CONTEXT BLOCK\n\
         Answer using only the context block above. If the context block does not \
         contain the answer, say \"I'm sorry, but I don't know the answer to that \
         question.\" Do not invent information that is not drawn from the context."
    )
}
