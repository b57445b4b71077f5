//! OpenTelemetry GenAI Semantic Convention attribute names.
//!
//! Used with `Span::record` on spans declared with the same dotted field
//! names. Library crates that cannot depend on this one declare the literal
//! names directly; these constants keep the binary's spellings in one place.

/// The name of the operation being performed (e.g., "chat", "summarize").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The provider that served the request (e.g., "grok").
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

/// The model the provider reported.
pub const GEN_AI_RESPONSE_MODEL: &str = "gen_ai.response.model";

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// Prompt tokens served from the provider's prefix cache.
pub const GEN_AI_USAGE_CACHED_TOKENS: &str = "gen_ai.usage.cached_input_tokens";

/// The conversation the call belongs to.
pub const GEN_AI_CONVERSATION_ID: &str = "gen_ai.conversation.id";

// --- Operation name values ---

/// A user-facing reply.
pub const OP_CHAT: &str = "chat";

/// Folding old turns into the running summary.
pub const OP_SUMMARIZE: &str = "summarize";

/// One thought/act/observe cycle of the reasoning loop.
pub const OP_REASON: &str = "reason";

/// Pulling durable memories out of a finished exchange.
pub const OP_EXTRACT: &str = "extract";
