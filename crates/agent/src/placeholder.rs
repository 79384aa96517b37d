//! Canned replies used in mock mode and when the fallback ladder runs out.
//!
//! Selection is deterministic: same input, same reply.

/// Prefix that marks a reply as synthesized after every vendor failed.
pub const EXHAUSTED_LABEL: &str = "[Offline reply: no model provider is reachable right now]";

/// Streamed placeholder chunk size, in characters.
pub const CHUNK_CHARS: usize = 4;

const TOPICS: &[(&[&str], &str)] = &[
    (
        &["hello", "hi", "hey"],
        "Hello. I'm here and listening. How are you feeling right now?",
    ),
    (
        &["anxiety", "anxious", "panic"],
        "That sounds heavy to carry on your own. What tends to set those feelings off for you?",
    ),
    (
        &["sad", "depress", "lonely"],
        "I'm sorry it has been so hard lately. You can take your time here. How long has it felt this way?",
    ),
    (
        &["goal", "want", "plan"],
        "Naming what you want is already a step. What is one small thing you could try this week?",
    ),
];

const FALLBACKS: &[&str] = &[
    "I understand. Please, go on.",
    "That sounds challenging. How did it make you feel?",
    "Thank you for telling me that. It takes courage to share.",
    "I'm listening. Tell me more about that.",
    "It seems like this really matters to you.",
];

/// Pick a reply for the user's last message.
pub fn reply_for(input: &str) -> String {
    let lower = input.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    for (keywords, reply) in TOPICS {
        // Short keywords must match a whole word ("hi" is not "this").
        let hit = keywords.iter().any(|k| {
            if k.len() <= 3 {
                words.contains(k)
            } else {
                lower.contains(k)
            }
        });
        if hit {
            return (*reply).to_string();
        }
    }

    let index = input.bytes().map(usize::from).sum::<usize>() % FALLBACKS.len();
    FALLBACKS[index].to_string()
}

/// The labeled reply returned when the ladder is exhausted.
pub fn exhausted_reply(input: &str) -> String {
    format!("{EXHAUSTED_LABEL} {}", reply_for(input))
}

/// Split text into chunks of at most `size` characters.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
