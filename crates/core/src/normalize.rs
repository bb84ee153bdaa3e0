use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{M}\p{Nd}\s]+").expect("valid tokenizer regex"));

/// Filler words the alumni office FAQ strips before matching.
pub const SPANISH_FILLERS: &[&str] = &[
    "dame",
    "deme",
    "dime",
    "dígame",
    "digame",
    "cómo",
    "como",
    "para",
    "por favor",
    "solicitar",
    "solicito",
    "pedir",
    "quiero",
    "quisiera",
    "me gustaría",
    "me gustaria",
    "necesito",
    "saber",
    "información",
    "informacion",
    "info",
    "sobre",
    "acerca de",
    "qué",
    "que",
    "cuál",
    "cual",
    "cuáles",
    "cuales",
    "son",
    "es",
    "mi",
    "el",
    "la",
    "los",
    "las",
    "un",
    "una",
];

/// Splits text into lowercase word tokens. Punctuation is a separator, never part of a token.
///
/// Input is composed to NFC first, so a decomposed "i\u{301}" compares equal to "í".
pub fn tokenize(input: &str) -> Vec<String> {
    let composed = input.nfc().collect::<String>().to_lowercase();
    NON_WORD
        .replace_all(&composed, " ")
        .split_whitespace()
        .map(ToString::to_string)
        .collect()
}

/// Case folding plus whole-token removal of a configurable stopword set.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    // Longest phrases first so "por favor" wins over a single-word entry at the same position.
    stopwords: Vec<Vec<String>>,
}

impl Normalizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut phrases = stopwords
            .into_iter()
            .map(|entry| tokenize(entry.as_ref()))
            .filter(|tokens| !tokens.is_empty())
            .collect::<Vec<_>>();
        phrases.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        phrases.dedup();

        Self { stopwords: phrases }
    }

    pub fn spanish_default() -> Self {
        Self::new(SPANISH_FILLERS.iter().copied())
    }

    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }

    pub fn normalize(&self, query: &str) -> String {
        let tokens = tokenize(query);
        let mut kept = Vec::with_capacity(tokens.len());
        let mut idx = 0;

        while idx < tokens.len() {
            match self
                .stopwords
                .iter()
                .find(|phrase| tokens[idx..].starts_with(phrase.as_slice()))
            {
                Some(phrase) => idx += phrase.len(),
                None => {
                    kept.push(tokens[idx].as_str());
                    idx += 1;
                }
            }
        }

        kept.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_punctuation() {
        let normalizer = Normalizer::new(Vec::<&str>::new());
        assert_eq!(
            normalizer.normalize("  ¿Certificado   de EGRESADO?! "),
            "certificado de egresado"
        );
    }

    #[test]
    fn strips_fillers_from_question() {
        let normalizer = Normalizer::spanish_default();
        assert_eq!(
            normalizer.normalize("¿Cómo solicitar mi certificado de egresado?"),
            "certificado de egresado"
        );
    }

    #[test]
    fn keeps_words_that_merely_contain_a_filler() {
        let normalizer = Normalizer::spanish_default();
        assert_eq!(normalizer.normalize("comodín"), "comodín");
        assert_eq!(normalizer.normalize("Paraninfo"), "paraninfo");
    }

    #[test]
    fn removes_multi_word_fillers() {
        let normalizer = Normalizer::spanish_default();
        assert_eq!(
            normalizer.normalize("Por favor, me gustaría el certificado de notas"),
            "certificado de notas"
        );
    }

    #[test]
    fn punctuation_only_input_is_empty() {
        let normalizer = Normalizer::spanish_default();
        assert_eq!(normalizer.normalize("¿¿??!!"), "");
        assert_eq!(normalizer.normalize(""), "");
    }

    #[test]
    fn decomposed_accents_stay_inside_the_word() {
        let normalizer = Normalizer::spanish_default();
        assert_eq!(normalizer.normalize("comodi\u{301}n"), "comodín");
        assert_eq!(
            normalizer.normalize("Necesito mi ti\u{301}tulo profesional"),
            "título profesional"
        );
    }

    #[test]
    fn repeated_stopwords_are_kept_once() {
        let normalizer = Normalizer::new(["para", "por favor", "mi", "para", "Por Favor"]);
        assert_eq!(normalizer.stopword_count(), 3);
    }

    #[test]
    fn stopword_set_is_configurable() {
        let normalizer = Normalizer::new(["give me", "how", "for"]);
        assert_eq!(
            normalizer.normalize("How do I apply FOR a transcript, give me steps"),
            "do i apply a transcript steps"
        );
    }
}
