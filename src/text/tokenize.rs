/// Character classes that drive segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    /// Han ideographs and kana: segmented into bigrams
    Ideograph,
    /// Letters and digits of alphabetic scripts: kept as whole words
    Word,
    /// Everything else separates tokens
    Separator,
}

fn classify(c: char) -> CharClass {
    let cp = c as u32;
    let ideograph = matches!(cp,
        0x3040..=0x30FF       // Hiragana, Katakana
        | 0x3400..=0x4DBF     // CJK Extension A
        | 0x4E00..=0x9FFF     // CJK Unified Ideographs
        | 0xF900..=0xFAFF     // CJK Compatibility Ideographs
        | 0x20000..=0x2FA1F   // Extensions B..F and supplement
    );
    if ideograph {
        CharClass::Ideograph
    } else if c.is_alphanumeric() || c == '_' {
        CharClass::Word
    } else {
        CharClass::Separator
    }
}

/// Split text into lowercase tokens.
///
/// Alphabetic and numeric runs become one token each. Runs of CJK
/// ideographs carry no word boundaries, so they are cut into overlapping
/// bigrams ("机器学习" → "机器", "器学", "学习"); a lone ideograph is kept
/// as a single token.
///
/// # Examples
///
/// ```
/// use feedmill::text::tokenize;
///
/// assert_eq!(tokenize("Rust, async!"), vec!["rust", "async"]);
/// assert_eq!(tokenize("学习Rust"), vec!["学习", "rust"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut run: Vec<char> = Vec::new();
    let mut run_class = CharClass::Separator;

    for c in text.chars() {
        let class = classify(c);
        if class != run_class {
            flush(&mut tokens, &run, run_class);
            run.clear();
            run_class = class;
        }
        if class != CharClass::Separator {
            run.push(c);
        }
    }
    flush(&mut tokens, &run, run_class);

    tokens
}

fn flush(tokens: &mut Vec<String>, run: &[char], class: CharClass) {
    match class {
        CharClass::Separator => {}
        _ if run.is_empty() => {}
        CharClass::Word => {
            let word: String = run.iter().collect();
            tokens.push(word.to_lowercase());
        }
        CharClass::Ideograph if run.len() == 1 => tokens.push(run[0].to_string()),
        CharClass::Ideograph => {
            for pair in run.windows(2) {
                tokens.push(pair.iter().collect());
            }
        }
    }
}
