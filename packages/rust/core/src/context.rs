//! Context assembly: ranked documents rendered into the system instruction.

use std::path::Path;

use kbchat_shared::{GenerationConfig, KbChatError, KnowledgeDocument, Result};

/// Placeholder replaced by the rendered context blocks.
pub const CONTEXT_PLACEHOLDER: &str = "{{CONTEXT}}";

/// Inserted instead of blocks when ranking returned nothing.
pub const NO_RECORDS_MARKER: &str = "관련된 기록이 없습니다.";

/// Built-in instruction template.
pub const DEFAULT_TEMPLATE: &str = "\
당신은 블로그와 유튜브에 기록된 여행 경험을 바탕으로 질문에 답하는 안내 도우미입니다.

[규칙]
1. 아래 [기록]에 있는 내용을 최우선 근거로 사용하고, 기록을 인용할 때는 제목과 URL을 함께 알려주세요.
2. 가격이나 운영 시간처럼 바뀔 수 있는 정보는 기록의 날짜를 밝히고 웹 검색으로 최신 정보를 확인하세요.
3. 기록에도 검색 결과에도 없는 내용은 지어내지 말고 모른다고 답하세요.
4. 친근하고 간결한 한국어로 답하세요.

[답변 구성]
- 기록에서 찾은 내용: 관련 기록의 요약과 출처
- 일반 정보: 기록 밖의 일반적인 여행 상식 (필요한 경우에만)
- 최신 검색 결과: 웹 검색으로 확인한 최근 정보와 출처

[기록]
{{CONTEXT}}
";

/// Render one document as a context block.
pub fn render_document(document: &KnowledgeDocument) -> String {
    format!(
        "---\nTitle: {}\nDate: {}\nType: {}\nURL: {}\nContent: {}\n---",
        document.title,
        document.recency_label(),
        document.doc_type,
        document.url,
        document.content
    )
}

/// Render ranked documents in rank order, or the no-records marker.
pub fn render_context(documents: &[&KnowledgeDocument]) -> String {
    if documents.is_empty() {
        return NO_RECORDS_MARKER.to_string();
    }
    documents
        .iter()
        .map(|d| render_document(d))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A system instruction template containing [`CONTEXT_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionTemplate {
    text: String,
}

impl InstructionTemplate {
    /// Validate and wrap a template string.
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if !text.contains(CONTEXT_PLACEHOLDER) {
            return Err(KbChatError::validation(format!(
                "instruction template must contain {CONTEXT_PLACEHOLDER}"
            )));
        }
        Ok(Self { text })
    }

    pub fn builtin() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Read a template from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| KbChatError::io(path, e))?;
        Self::new(text)
    }

    /// The configured template file, or the built-in template.
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        match &config.template_path {
            Some(path) => Self::load(Path::new(path)),
            None => Ok(Self::builtin()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Substitute the rendered context for the placeholder.
    pub fn render(&self, documents: &[&KnowledgeDocument]) -> String {
        self.text
            .replacen(CONTEXT_PLACEHOLDER, &render_context(documents), 1)
    }
}

impl Default for InstructionTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str, date_code: u32) -> KnowledgeDocument {
        KnowledgeDocument {
            id: title.into(),
            title: title.into(),
            content: format!("{title} 본문"),
            doc_type: "blog".into(),
            url: format!("https://blog.example.com/{title}"),
            date_code,
            source_file: format!("{title}.json"),
        }
    }

    #[test]
    fn test_block_contains_all_fields() {
        let block = render_document(&doc("호핑", 202512));
        assert!(block.starts_with("---\n"));
        assert!(block.ends_with("\n---"));
        assert!(block.contains("Title: 호핑"));
        assert!(block.contains("Date: 2025-12"));
        assert!(block.contains("Type: blog"));
        assert!(block.contains("URL: https://blog.example.com/호핑"));
        assert!(block.contains("Content: 호핑 본문"));
    }

    #[test]
    fn test_empty_ranking_renders_marker() {
        let rendered = InstructionTemplate::builtin().render(&[]);
        assert!(rendered.contains(NO_RECORDS_MARKER));
        assert!(!rendered.contains(CONTEXT_PLACEHOLDER));
        assert!(!rendered.contains("Title:"));
    }

    #[test]
    fn test_blocks_keep_rank_order() {
        let first = doc("first", 202301);
        let second = doc("second", 202512);
        let rendered = render_context(&[&first, &second]);

        let a = rendered.find("Title: first").unwrap();
        let b = rendered.find("Title: second").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_placeholder_is_required() {
        assert!(InstructionTemplate::new("no slot here").is_err());
        let template = InstructionTemplate::new("before {{CONTEXT}} after").unwrap();
        let rendered = template.render(&[&doc("x", 0)]);
        assert!(rendered.starts_with("before ---"));
        assert!(rendered.contains("Date: unknown"));
        assert!(rendered.ends_with("--- after"));
    }

    #[test]
    fn test_load_template_from_file() {
        let dir = std::env::temp_dir().join(format!("kbchat-tpl-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("template.txt");
        std::fs::write(&path, "Answer using:\n{{CONTEXT}}\n").unwrap();

        let config = GenerationConfig {
            template_path: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let template = InstructionTemplate::from_config(&config).unwrap();
        assert!(template.as_str().starts_with("Answer using:"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_template_file_is_io_error() {
        let err = InstructionTemplate::load(Path::new("/nonexistent/kbchat/template.txt"))
            .unwrap_err();
        assert!(matches!(err, KbChatError::Io { .. }));
    }
}
