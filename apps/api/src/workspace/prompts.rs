// Workspace LLM prompt templates.
// All prompts for the workspace module are defined here.

pub const INTERPRET_SYSTEM: &str = "\
You are a prompt-engineering assistant. \
Turn a user's natural-language request into a concise topic and keyword lists \
for generating an image/text prompt. \
Positive keywords describe what the prompt should contain; negative keywords \
describe what it must avoid. Keep keywords short (1-3 words each).";

pub const INTERPRET_PROMPT: &str = r#"Interpret the following request into a prompt topic and keyword lists.

REQUEST:
{intent}

TARGET LANGUAGE: {language}

OUTPUT SCHEMA (return exactly this structure):
{
  "topic": "string (short title for the prompt, in the target language)",
  "positive_keywords": [{"word": "string", "weight": 0.0-1.0}],
  "negative_keywords": [{"word": "string", "weight": 0.0-1.0}]
}

RULES:
- 5 to 15 positive keywords, 0 to 10 negative keywords.
- No duplicate words within a list (case-insensitive).
- weight reflects how central the keyword is to the request."#;

pub const EXPAND_SYSTEM: &str = "\
You are a prompt-engineering assistant expanding an existing keyword set. \
Propose NEW keywords only; repeating an existing keyword wastes the call.";

pub const EXPAND_PROMPT: &str = r#"Propose additional keywords for this prompt topic.

TOPIC: {topic}
TARGET LANGUAGE: {language}
DIRECTION HINT (may be empty): {hint}

ALREADY PRESENT (do not repeat any of these):
positive: {positive}
negative: {negative}

OUTPUT SCHEMA (return exactly this structure):
{
  "positive_keywords": [{"word": "string", "weight": 0.0-1.0}],
  "negative_keywords": [{"word": "string", "weight": 0.0-1.0}]
}

RULES:
- 3 to 10 new positive keywords, 0 to 5 new negative keywords.
- Every proposed word must be absent from the ALREADY PRESENT lists."#;

pub const DRAFT_SYSTEM: &str = "\
You are a prompt-engineering assistant writing a complete, ready-to-use \
prompt body. Respond with the prompt text only — no preamble, no headings, \
no commentary about what you did.";

pub const DRAFT_PROMPT: &str = r#"Write a complete prompt body for the following topic and keywords.

TOPIC: {topic}
TARGET LANGUAGE: {language}

MUST INCLUDE (positive keywords, highest weight first):
{positive}

MUST AVOID (negative keywords):
{negative}

The output is the prompt body itself, written in the target language,
usable as-is."#;
