/// Normalize inbound text before matching.
///
/// Phones and chat clients turn straight quotes into curly ones; templates are
/// written with straight quotes, so fold them back and trim.
pub fn clean_text(text: &str) -> String {
    text.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .trim()
        .to_string()
}
