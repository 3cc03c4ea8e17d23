//! Prompt templates.
//!
//! Placeholders are `{name}`; literal braces are written `{{` and `}}`.
//! Rendering is done by [`render_template`](crate::orchestrator::render_template).

/// Question synthesis. Placeholders: `role`, `company`, `context`.
pub const QUESTION_TEMPLATE: &str = r#"You prepare candidates for job interviews.

Ground rules:
- Draw only on the CONTEXT below, which holds excerpts of the candidate's resume and the job description.
- Never make up skills, employers, projects, or experience the context does not mention.
- When the context is thin or empty, fall back to general questions for the role.

Write a set of interview questions that mixes technical, behavioral, project, and general questions.

Reply with JSON only, in exactly this shape:
{{
  "questions": [
    {{ "type": "technical", "question": "..." }},
    {{ "type": "behavioral", "question": "..." }},
    {{ "type": "project", "question": "..." }},
    {{ "type": "general", "question": "..." }}
  ]
}}

ROLE: {role}
COMPANY: {company}

CONTEXT:
{context}
"#;

/// Answer evaluation. Placeholders: `role`, `company`, `question`,
/// `answer`, `context`.
pub const SCORE_TEMPLATE: &str = r#"You evaluate answers given in job interviews.

Ground rules:
- Judge using only the ANSWER and the CONTEXT (resume and job description excerpts).
- Never make up resume facts, numbers, skills, or employers.
- Claims the context does not support count as weak.
- Generic or vague statements earn no credit.

Score each criterion from 0 to 5:
- relevance: does the answer address the question, the role, and the job description?
- clarity: is it easy to follow and well phrased?
- technical_correctness: are the technical claims accurate and at the right level for the role?
- structure: is it organised (STAR for behavioral questions, clear steps for technical ones)?
- impact: does it give concrete outcomes, metrics, or examples?

Scale:
- 0: missing or entirely wrong
- 1: very weak, mostly off topic, unclear, or incorrect
- 3: acceptable, partly specific, mostly correct
- 5: excellent, specific, well organised, aligned with the role, with clear results

Reply with JSON only, in exactly this shape:
{{
  "breakdown": {{
    "relevance": 0,
    "clarity": 0,
    "technical_correctness": 0,
    "structure": 0,
    "impact": 0
  }},
  "strengths": ["..."],
  "improvements": ["..."],
  "improved_answer": "..."
}}

Limits:
- strengths: 2 to 4 items of at most 18 words each
- improvements: 2 to 4 items of at most 18 words each
- improved_answer: at most 120 words, adding no facts beyond the context

ROLE: {role}
COMPANY: {company}
QUESTION: {question}
ANSWER: {answer}

CONTEXT:
{context}
"#;
