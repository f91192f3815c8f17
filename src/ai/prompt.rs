use crate::github::FileContent;

use super::TestSummary;

/// Code-fence language for a path, derived from its extension.
pub fn fence_language(path: &str) -> String {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "js" => "javascript".to_string(),
        "ts" => "typescript".to_string(),
        "py" => "python".to_string(),
        "cs" => "csharp".to_string(),
        "rb" => "ruby".to_string(),
        _ => ext,
    }
}

fn fenced(path: &str, content: &str) -> String {
    format!("```{}\n{}\n```", fence_language(path), content)
}

pub fn summaries_prompt(files: &[FileContent]) -> String {
    let sources = files
        .iter()
        .map(|file| format!("File: {}\n{}", file.path(), fenced(file.path(), &file.content)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Analyze the following code files and generate test case summaries.\n\
         Respond ONLY with a JSON array like:\n\
         [\n  {{ \"title\": \"Test case title\", \"description\": \"Test case description\" }}\n]\n\
         Do not include any extra text or explanation.\n\n\
         {sources}\n"
    )
}

pub fn test_code_prompt(file: &FileContent, summary: &TestSummary) -> String {
    format!(
        "Generate complete test code for the following scenario.\n\
         Return ONLY valid JSON: {{ \"code\": \"<full test code string>\" }}\n\
         Use the idiomatic testing framework for the language and include all imports.\n\
         File: {path}\n\
         Title: {title}\n\
         Description: {description}\n\
         Source:\n\
         {source}\n",
        path = file.path(),
        title = summary.title,
        description = summary.description,
        source = fenced(file.path(), &file.content),
    )
}
