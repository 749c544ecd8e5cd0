//! Prompt construction and placeholder protection

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::core::config::ContextFields;
use crate::core::models::TranslationRequest;

const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("tr", "Turkish"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh-CN", "Chinese (Simplified)"),
    ("zh-TW", "Chinese (Traditional)"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("nl", "Dutch"),
    ("sv", "Swedish"),
    ("pl", "Polish"),
    ("uk", "Ukrainian"),
    ("cs", "Czech"),
    ("el", "Greek"),
    ("he", "Hebrew"),
    ("id", "Indonesian"),
    ("th", "Thai"),
    ("vi", "Vietnamese"),
    ("ro", "Romanian"),
    ("hu", "Hungarian"),
    ("da", "Danish"),
    ("fi", "Finnish"),
    ("no", "Norwegian"),
    ("bg", "Bulgarian"),
    ("hr", "Croatian"),
    ("sr", "Serbian"),
    ("sk", "Slovak"),
    ("sl", "Slovenian"),
    ("lt", "Lithuanian"),
    ("lv", "Latvian"),
    ("et", "Estonian"),
];

const PLACEHOLDER_PATTERN: &str = concat!(
    r"(%(?:\d+\$)?[-+# 0,(]*\d*\.?\d*[sdfiboxXeEgGcChHnAt%])",
    r"|(\{\{[^}]*\}\})",
    r"|(\{[^}]*\})",
    r"|(<[^>]+>)",
    r"|(\$\{[^}]+\})",
    r"|(\$[A-Za-z_]\w*)",
);

const NON_TRANSLATABLE_PATTERN: &str = r"^[\p{P}\p{S}\d\s]*$";

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern compiles"))
}

fn non_translatable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(NON_TRANSLATABLE_PATTERN).expect("non-translatable pattern compiles")
    })
}

/// Source languages, `auto` first
pub fn supported_source_languages() -> Vec<&'static str> {
    std::iter::once("auto")
        .chain(LANGUAGES.iter().map(|(code, _)| *code))
        .collect()
}

pub fn supported_target_languages() -> Vec<&'static str> {
    LANGUAGES.iter().map(|(code, _)| *code).collect()
}

/// English display name for a language code; unknown codes are returned as-is
pub fn language_name(code: &str) -> String {
    if code.eq_ignore_ascii_case("auto") {
        return "Auto Detect".to_string();
    }
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Concatenate the user context fields into one directive line
pub fn build_user_context_directive(fields: &ContextFields) -> String {
    let mut directive = String::new();
    let parts = [
        ("App", &fields.app_name),
        ("Type", &fields.app_type),
        ("Audience", &fields.audience),
        ("Tone", &fields.tone),
    ];
    for (label, value) in parts {
        if !value.trim().is_empty() {
            directive.push_str(&format!("{}: {}. ", label, value.trim()));
        }
    }
    if !fields.notes.trim().is_empty() {
        directive.push_str(&format!("Notes: {}", fields.notes.trim()));
    }
    directive.trim().to_string()
}

/// User prompt for a single string
pub fn build_translation_prompt(request: &TranslationRequest, text: &str) -> String {
    let target = language_name(&request.target_lang);
    let mut prompt = String::new();

    if request.is_auto_source() {
        prompt.push_str(&format!("Translate the following text to {}.\n", target));
    } else {
        prompt.push_str(&format!(
            "Translate the following text from {} to {}.\n",
            language_name(&request.source_lang),
            target
        ));
    }

    prompt.push_str("Context: This content belongs to an application UI. Preserve semantics and ensure wording fits an app interface.\n");
    if !request.context.trim().is_empty() {
        prompt.push_str(request.context.trim());
        prompt.push('\n');
    }
    prompt.push_str("IMPORTANT: Return ONLY the translated text, without any explanations, notes, or additional formatting.\n");
    prompt.push_str("Keep emojis exactly as they appear.\n");
    prompt.push_str("Tokens like __PH0__, __PH1__ etc. are protected placeholders. Keep them EXACTLY as-is: do not translate, modify, reorder, or remove them.\n");
    prompt.push_str("Translate only the human-readable words around them.\n");
    prompt.push_str("Do not add quotes, prefixes, or suffixes. Just the pure translation.\n\n");
    prompt.push_str("Text to translate:\n");
    prompt.push_str(text);

    prompt
}

/// System prompt for chat-style providers (OpenAI, Claude)
pub fn build_system_prompt(request: &TranslationRequest) -> String {
    let mut system = format!(
        "You are a professional translation engine working on application strings. Translate from {} to {}. ",
        language_name(&request.source_lang),
        language_name(&request.target_lang)
    );
    system.push_str("ABSOLUTE RULES: ");
    system.push_str("1) Tokens like __PH0__, __PH1__ etc. are protected placeholders. Keep them EXACTLY as-is in the translation. Do NOT translate, modify, reorder, or remove them. ");
    system.push_str("2) Keep emojis exactly as they appear. ");
    system.push_str("3) Return ONLY the translated text, with no quotes, explanations, or commentary. ");
    system.push_str("4) Keep the translation natural and appropriate for an app UI.");
    if !request.context.trim().is_empty() {
        system.push_str(" Additional context: ");
        system.push_str(request.context.trim());
    }
    system
}

/// Text with placeholders swapped for `__PHn__` tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenized {
    pub text: String,
    pub placeholders: Vec<String>,
}

impl Tokenized {
    pub fn has_placeholders(&self) -> bool {
        !self.placeholders.is_empty()
    }
}

pub fn tokenize_placeholders(text: &str) -> Tokenized {
    let mut placeholders = Vec::new();
    let tokenized = placeholder_regex().replace_all(text, |caps: &regex::Captures<'_>| {
        let token = format!("__PH{}__", placeholders.len());
        placeholders.push(caps[0].to_string());
        token
    });

    Tokenized {
        text: tokenized.into_owned(),
        placeholders,
    }
}

pub fn restore_placeholders(translated: &str, placeholders: &[String]) -> String {
    let mut result = translated.to_string();
    for (i, original) in placeholders.iter().enumerate() {
        let token = format!("__PH{}__", i);
        if result.contains(&token) {
            result = result.replace(&token, original);
        }
    }
    result
}

/// Every placeholder of `original` must appear at least as often in `translated`
pub fn validate_placeholders(original: &str, translated: &str) -> bool {
    let mut expected: BTreeMap<&str, usize> = BTreeMap::new();
    for m in placeholder_regex().find_iter(original) {
        *expected.entry(m.as_str()).or_default() += 1;
    }

    expected
        .into_iter()
        .all(|(placeholder, count)| translated.matches(placeholder).count() >= count)
}

/// Strings made of punctuation, symbols, digits and whitespace only
pub fn is_non_translatable(text: &str) -> bool {
    text.is_empty() || non_translatable_regex().is_match(text)
}

/// Strip one pair of enclosing double quotes
pub fn strip_enclosing_quotes(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_omits_source_for_auto() {
        let request = TranslationRequest::new("Hello", "auto", "es");
        let prompt = build_translation_prompt(&request, "Hello");
        assert!(prompt.starts_with("Translate the following text to Spanish.\n"));
        assert!(prompt.ends_with("Text to translate:\nHello"));

        let request = TranslationRequest::new("Hello", "en", "de");
        let prompt = build_translation_prompt(&request, "Hello");
        assert!(prompt.starts_with("Translate the following text from English to German.\n"));
    }

    #[test]
    fn test_prompt_includes_context_directive() {
        let request = TranslationRequest::new("Hi", "auto", "fr").with_context("App: Notes. Tone: Friendly.");
        let prompt = build_translation_prompt(&request, "Hi");
        assert!(prompt.contains("App: Notes. Tone: Friendly.\n"));
        assert!(build_system_prompt(&request).ends_with("Additional context: App: Notes. Tone: Friendly."));
    }

    #[test]
    fn test_user_context_directive() {
        let fields = ContextFields {
            app_name: "Tasks".to_string(),
            app_type: String::new(),
            audience: "Students".to_string(),
            tone: "Casual".to_string(),
            notes: "Avoid slang".to_string(),
        };
        assert_eq!(
            build_user_context_directive(&fields),
            "App: Tasks. Audience: Students. Tone: Casual. Notes: Avoid slang"
        );
        assert_eq!(build_user_context_directive(&ContextFields::default()), "");
    }

    #[test]
    fn test_placeholder_round_trip() {
        let original = "Hello %1$s, you have {count} new <b>messages</b> in ${folder}";
        let tokenized = tokenize_placeholders(original);
        assert_eq!(
            tokenized.text,
            "Hello __PH0__, you have __PH1__ new __PH2__messages__PH3__ in __PH4__"
        );

        let translated = "Hola __PH0__, tienes __PH1__ __PH2__mensajes__PH3__ nuevos en __PH4__";
        let restored = restore_placeholders(translated, &tokenized.placeholders);
        assert_eq!(
            restored,
            "Hola %1$s, tienes {count} <b>mensajes</b> nuevos en ${folder}"
        );
        assert!(validate_placeholders(original, &restored));
    }

    #[test]
    fn test_validate_detects_dropped_placeholder() {
        assert!(!validate_placeholders("%s and %s", "%s y"));
        assert!(validate_placeholders("no placeholders", "sin marcadores"));
    }

    #[test]
    fn test_non_translatable() {
        assert!(is_non_translatable("123 - 456"));
        assert!(is_non_translatable("!!!"));
        assert!(!is_non_translatable("Save"));
    }

    #[test]
    fn test_strip_enclosing_quotes() {
        assert_eq!(strip_enclosing_quotes("\"Hola\""), "Hola");
        assert_eq!(strip_enclosing_quotes(" Hola "), "Hola");
        assert_eq!(strip_enclosing_quotes("\""), "\"");
        assert_eq!(strip_enclosing_quotes("say \"hi\""), "say \"hi\"");
    }

    #[test]
    fn test_language_name() {
        assert_eq!(language_name("zh-cn"), "Chinese (Simplified)");
        assert_eq!(language_name("xx"), "xx");
        assert_eq!(supported_source_languages()[0], "auto");
        assert_eq!(supported_target_languages().len(), 37);
    }
}
