// AI endpoints: document/text conversion, content improvement, section reordering,
// ATS feedback and model listing.
// All model calls go through llm_client, which retries transient failures.

pub mod handlers;
pub mod prompts;
