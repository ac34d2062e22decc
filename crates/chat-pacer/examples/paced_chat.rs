use std::io::Write as _;
use std::sync::Arc;

use chat_pacer::init_observability;
use chat_pacer::prelude::*;
use chat_pacer::vendors::openai_compat::OpenAiCompatProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    init_observability();

    let client = ChatClient::builder()
        .register_provider(Arc::new(OpenAiCompatProvider::from_env()?))
        .pacing(PacingConfig::from_env()?)
        .build()?;

    let model: ModelRef = std::env::var("CHAT_PACER_MODEL")
        .unwrap_or_else(|_| "openai-compat/gpt-4o-mini".into())
        .parse()?;
    let mut stream = client
        .stream_chat(
            ChatRequest::new(model)
                .message(ChatMessage::system("You are a concise assistant."))
                .message(ChatMessage::user("Write two sentences about rivers.")),
        )
        .await?;

    while let Some(chunk) = stream.next_chunk().await {
        print!("{}", chunk?.text());
        let _ = std::io::stdout().flush();
    }
    println!();

    let state = stream.state();
    eprintln!(
        "released {} chunks, {} chars, {} liveness waits",
        state.released, state.tokens_output, state.liveness_waits
    );
    Ok(())
}
