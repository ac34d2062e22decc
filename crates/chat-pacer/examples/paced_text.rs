use std::sync::Arc;

use chat_pacer::init_observability;
use chat_pacer::prelude::*;
use chat_pacer::vendors::openai_compat::OpenAiCompatProvider;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    init_observability();

    let client = ChatClient::builder()
        .register_provider(Arc::new(OpenAiCompatProvider::from_env()?))
        .build()?;

    let model: ModelRef = std::env::var("CHAT_PACER_MODEL")
        .unwrap_or_else(|_| "openai-compat/gpt-4o-mini".into())
        .parse()?;
    let mut stream = client
        .stream_text(
            ChatRequest::new(model)
                .message(ChatMessage::user("Count from one to five in words.")),
        )
        .await?;

    let abort = stream.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        abort.abort();
    });

    while let Some(chunk) = stream.next_chunk().await {
        let chunk = chunk?;
        println!("{} {:?}", chunk.id, chunk.text());
    }
    Ok(())
}
