/// Prompt formats the heuristic knows about
pub const KNOWN_FORMATS: &[&str] = &["chat-ml", "alpaca", "user-assistant-newlines", "mistral"];

const LINE_NEEDLES: &[&str] = &["prompt template", "prompt format", "prompt_format"];

/// Guess a model's prompt format from its README text.
///
/// First looks for a line that mentions a prompt template together with a
/// known format name, then falls back to sniffing for format-specific
/// markers anywhere in the text. Returns an empty string if nothing matches.
#[must_use]
pub fn guess_prompt_format(readme: &str) -> String {
    for line in readme.lines() {
        let line = line.to_lowercase();
        if LINE_NEEDLES.iter().any(|needle| line.contains(needle)) {
            if let Some(format) = KNOWN_FORMATS.iter().find(|f| line.contains(*f)) {
                return (*format).to_string();
            }
        }
    }

    let text = readme.to_lowercase();
    let sniffed = if text.contains("<|im_start|>") {
        "chat-ml"
    } else if text.contains("### instruction:") {
        "alpaca"
    } else if text.contains("### user:") {
        "user-assistant-newlines"
    } else if text.contains("[inst]") && text.contains("[/inst]") {
        "mistral"
    } else {
        ""
    };
    sniffed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_template_line() {
        let readme = "# Model\n\n## Prompt template: Alpaca\n\nBelow is an instruction";
        assert_eq!(guess_prompt_format(readme), "alpaca");
    }

    #[test]
    fn test_template_line_beats_sniffing() {
        let readme = "prompt_format: mistral\n<|im_start|>system\n";
        assert_eq!(guess_prompt_format(readme), "mistral");
    }

    #[test]
    fn test_template_line_without_known_format_falls_through() {
        let readme = "Prompt format: Vicuna\n### User:\nhi\n";
        assert_eq!(guess_prompt_format(readme), "user-assistant-newlines");
    }

    #[test]
    fn test_sniffing() {
        assert_eq!(guess_prompt_format("<|im_start|>user\nhi<|im_end|>"), "chat-ml");
        assert_eq!(guess_prompt_format("### Instruction:\ndo it"), "alpaca");
        assert_eq!(guess_prompt_format("[INST] hi [/INST]"), "mistral");
        assert_eq!(guess_prompt_format("[INST] only an opener"), "");
    }

    #[test]
    fn test_no_hint() {
        assert_eq!(guess_prompt_format(""), "");
        assert_eq!(guess_prompt_format("Just a readme."), "");
    }
}
