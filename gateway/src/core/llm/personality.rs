//! Maps character tags to a persona directive.

/// Directive used when a character carries no tags.
pub const NEUTRAL_PERSONA: &str = "You have a neutral, friendly personality and speak naturally.";

struct TraitRule {
    keywords: &'static [&'static str],
    trait_phrase: &'static str,
    behavior: &'static str,
}

/// Checked in order; the first rule with a keyword contained in the tag wins.
const RULES: &[TraitRule] = &[
    TraitRule {
        keywords: &["shy", "timid", "dandere"],
        trait_phrase: "shy and reserved",
        behavior: "speak softly with short responses, often hesitating or trailing off",
    },
    TraitRule {
        keywords: &["dominant", "assertive", "confident"],
        trait_phrase: "confident and commanding",
        behavior: "speak with authority and confidence, taking charge of conversations",
    },
    TraitRule {
        keywords: &["kind", "gentle", "caring"],
        trait_phrase: "warm and compassionate",
        behavior: "show genuine care and empathy, ask about their wellbeing",
    },
    TraitRule {
        keywords: &["playful", "fun", "deredere"],
        trait_phrase: "playful and energetic",
        behavior: "use humor, light teasing, and enthusiastic responses",
    },
    TraitRule {
        keywords: &["serious", "formal", "kuudere"],
        trait_phrase: "serious and composed",
        behavior: "maintain a calm, analytical tone with measured responses",
    },
    TraitRule {
        keywords: &["flirty", "seductive"],
        trait_phrase: "flirtatious and charming",
        behavior: "use subtle charm, compliments, and playful innuendo",
    },
    TraitRule {
        keywords: &["quiet", "introverted"],
        trait_phrase: "quiet and thoughtful",
        behavior: "give short, meaningful responses with long pauses",
    },
    TraitRule {
        keywords: &["outgoing", "extroverted"],
        trait_phrase: "outgoing and talkative",
        behavior: "be enthusiastic, ask lots of questions, share stories",
    },
    TraitRule {
        keywords: &["mysterious", "enigmatic"],
        trait_phrase: "mysterious and cryptic",
        behavior: "speak in riddles, reveal little about yourself, be vague",
    },
    TraitRule {
        keywords: &["tsundere"],
        trait_phrase: "tsundere (initially cold but secretly caring)",
        behavior: "act dismissive or irritated but show subtle signs of affection",
    },
    TraitRule {
        keywords: &["yandere"],
        trait_phrase: "obsessive and possessive",
        behavior: "show intense devotion and jealousy",
    },
    TraitRule {
        keywords: &["submissive"],
        trait_phrase: "submissive and deferential",
        behavior: "seek approval, ask for permission, speak meekly",
    },
    TraitRule {
        keywords: &["rebellious"],
        trait_phrase: "rebellious and defiant",
        behavior: "challenge authority, be sarcastic, question everything",
    },
    TraitRule {
        keywords: &["villain"],
        trait_phrase: "villainous and scheming",
        behavior: "be manipulative, hint at dark plans, enjoy others' discomfort",
    },
    TraitRule {
        keywords: &["hero"],
        trait_phrase: "heroic and noble",
        behavior: "be selfless, encouraging, always try to help others",
    },
    TraitRule {
        keywords: &["bully"],
        trait_phrase: "intimidating and aggressive",
        behavior: "be condescending, tease harshly, assert dominance",
    },
];

/// Stateless persona directive builder.
pub struct PersonalityBuilder;

impl PersonalityBuilder {
    /// Builds the directive for `tags`. Pure: equal inputs give equal output.
    pub fn build<S: AsRef<str>>(tags: &[S]) -> String {
        let mut traits: Vec<&str> = Vec::new();
        let mut behaviors: Vec<&str> = Vec::new();

        for tag in tags {
            let tag = tag.as_ref().trim();
            if tag.is_empty() {
                continue;
            }
            let lower = tag.to_lowercase();
            match RULES
                .iter()
                .find(|rule| rule.keywords.iter().any(|kw| lower.contains(kw)))
            {
                Some(rule) => {
                    traits.push(rule.trait_phrase);
                    behaviors.push(rule.behavior);
                }
                None => traits.push(tag),
            }
        }

        if traits.is_empty() {
            return NEUTRAL_PERSONA.to_string();
        }

        let mut directive = format!("You are {}.", traits.join(", "));
        if !behaviors.is_empty() {
            directive.push_str(&format!(" In conversations, {}.", behaviors.join(" and ")));
        }
        directive
    }
}
