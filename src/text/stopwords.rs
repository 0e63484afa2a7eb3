use std::collections::HashSet;
use std::sync::OnceLock;

/// Words that carry no topic: English function words, HTML/web noise, and
/// common Chinese particles and connectives (as bigrams, matching the
/// tokenizer's output).
const STOPWORDS: &[&str] = &[
    // English
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
    "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
    "during", "each", "even", "few", "for", "from", "further", "get", "got", "had", "has",
    "have", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
    "how", "however", "if", "in", "into", "is", "it", "its", "itself", "just", "let",
    "like", "may", "me", "might", "more", "most", "much", "must", "my", "myself", "new",
    "no", "nor", "not", "now", "of", "off", "on", "once", "one", "only", "or", "other",
    "our", "ours", "ourselves", "out", "over", "own", "said", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves",
    "then", "there", "these", "they", "this", "those", "through", "to", "too", "two",
    "under", "until", "up", "us", "use", "used", "using", "very", "via", "was", "we",
    "well", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours", "yourself", "yourselves",
    // Web noise
    "amp", "br", "com", "div", "href", "html", "http", "https", "img", "nbsp", "quot",
    "span", "src", "www",
    // Chinese
    "一个", "一些", "一种", "一样", "不是", "不过", "也是", "了解", "什么", "他们", "以及",
    "以后", "但是", "你们", "使用", "们的", "其中", "其实", "出来", "分享", "到了", "可以",
    "可能", "因为", "因此", "如何", "如果", "就是", "已经", "我们", "所以", "所有", "是一",
    "是否", "时候", "更多", "最后", "有些", "有的", "没有", "现在", "然后", "特别", "由于",
    "的话", "的是", "目前", "而且", "自己", "虽然", "还是", "还有", "这个", "这些", "这是",
    "这样", "进行", "通过", "那么", "那些", "需要", "非常", "原文", "阅读", "文章", "点击",
];

fn stopword_set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOPWORDS.iter().copied().collect())
}

/// True when `word` (already lowercased) should be ignored by keyword extraction
pub fn is_stopword(word: &str) -> bool {
    stopword_set().contains(word)
}
