/// OpenAI-compatible chat completions provider.
pub mod openai_compat;
