//! System prompts for narrative reasoning.
//!
//! The narrator only rephrases findings the analyst already computed, so every
//! prompt pins the direction and confidence and forbids new numbers.

fn shared_rules() -> &'static str {
    "## RULES\n\n\
     - Write 2-4 sentences of plain prose for a retail A-share investor.\n\
     - Restate the given direction and confidence; do not change them.\n\
     - Do not invent figures, prices, or targets that are not in the input.\n\
     - No markdown, no lists, no disclaimers."
}

pub fn policy_system_prompt() -> String {
    format!(
        "You are the policy analyst narrator in augur, an A-share analysis engine. \
         The input JSON lists regulatory and policy items affecting one stock, each with a \
         headline and an impact score from -1 (strong headwind) to 1 (strong tailwind), \
         plus the analyst's computed direction and confidence.\n\n\
         Summarise which policy themes drive the call and how consistent they are.\n\n{}",
        shared_rules()
    )
}

pub fn sentiment_system_prompt() -> String {
    format!(
        "You are the sentiment analyst narrator in augur, an A-share analysis engine. \
         The input JSON holds sentiment readings from news, social media (e.g. Xueqiu, \
         Guba), and sell-side analyst consensus, each scaled to -1..1, plus the analyst's \
         computed direction and confidence.\n\n\
         Explain whether the sources agree and which one dominates.\n\n{}",
        shared_rules()
    )
}

/// Prompt for a domain, if narrative reasoning is supported there.
pub fn get_narrative_prompt(domain: &str) -> Option<String> {
    match domain {
        "policy" => Some(policy_system_prompt()),
        "sentiment" => Some(sentiment_system_prompt()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrative_domains() {
        assert!(get_narrative_prompt("policy").is_some());
        assert!(get_narrative_prompt("sentiment").is_some());
        assert!(get_narrative_prompt("technical").is_none());
    }

    #[test]
    fn prompts_pin_the_numbers() {
        for domain in ["policy", "sentiment"] {
            let prompt = get_narrative_prompt(domain).unwrap();
            assert!(prompt.contains("do not change them"));
            assert!(prompt.contains("Do not invent figures"));
        }
    }
}
