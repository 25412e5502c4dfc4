//! Instruction templates for extraction, question answering, and answer refinement.
//!
//! Every template repeats the same fidelity rules so the model stays grounded in the supplied
//! text. Outline markup uses `## ` for topics, `### ` for subtopics, and `- ` for points; the
//! outline merger parses exactly these markers.

/// System message sent with every completion call.
pub const SYSTEM_MESSAGE: &str = "\
You are an expert academic content analyzer. Your only job is to extract and organize the \
information that is actually present in the texts you are given.

RULES:
1. Include only information that is explicitly present in the provided text.
2. Never generate content beyond what the text contains.
3. Keep the document's own terminology and concepts.
4. Organize content hierarchically in the order it appears in the source.";

const FIDELITY_RULES: &str = "\
2. CRITICAL: include ONLY information that ACTUALLY EXISTS in the provided text.
3. Use the EXACT terminology and concepts from the text.
4. When the text gives specific examples, definitions, or metrics, include them.
5. Keep the logical flow and organization of the original content.
6. CRITICAL: OMIT bibliographic content such as references, citations, and author lists.";

/// Build the outline-extraction instruction for one chunk.
///
/// `previous_headings` are level-1 heading lines extracted earlier in the document; when
/// present the model is asked to reuse them where the chunk's content genuinely belongs there.
pub fn extraction_prompt(chunk_text: &str, previous_headings: Option<&[String]>) -> String {
    let context = match previous_headings {
        Some(headings) if !headings.is_empty() => format!(
            "For context, these main headings were extracted from earlier parts of the document:\n\
             {}\n\n\
             Organize this text under those headings where appropriate, but ONLY when its content \
             actually belongs under them.\n\n",
            headings.join("\n")
        ),
        _ => String::new(),
    };

    format!(
        "TASK: Carefully read the following text and extract its factual content into a \
         structured outline.\n\n\
         {context}\
         EXTRACTION RULES:\n\
         1. Produce a hierarchical outline with:\n   \
         - Main topics (use ## format)\n   \
         - Subtopics (use ### format)\n   \
         - Key points as bullet points (use - format)\n\
         {FIDELITY_RULES}\n\n\
         TEXT TO ANALYZE:\n\
         {chunk_text}\n"
    )
}

/// Build the question-answering instruction for one chunk.
pub fn answer_prompt(chunk_text: &str, question: &str) -> String {
    format!(
        "TASK: Carefully read the following text and question, and answer the question using \
         only the factual content of the text.\n\n\
         ANSWERING RULES:\n\
         1. Answer in one continuous, concise paragraph.\n\
         {FIDELITY_RULES}\n\n\
         TEXT TO ANALYZE:\n\
         {chunk_text}\n\n\
         QUESTION TO ANSWER:\n\
         {question}\n"
    )
}

/// Build the instruction that condenses an assembled answer to its key points.
pub fn refinement_prompt(accumulated_answer: &str) -> String {
    format!(
        "TASK: Carefully read the following answer and reduce it to its most important key \
         points.\n\n\
         ANSWERING RULES:\n\
         1. Answer in one continuous, concise paragraph.\n\
         {FIDELITY_RULES}\n\n\
         TEXT TO ANALYZE:\n\
         {accumulated_answer}\n"
    )
}
