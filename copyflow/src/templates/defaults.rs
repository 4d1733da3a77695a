//! Built-in prompt templates, one per stage.
//!
//! Variables are the stage's state keys with `.` replaced by `_`.

use crate::core::StageId;

const REQUIREMENTS: &str = r"你是一位资深的公关传播策划。请从下面的甲方原始需求材料中提炼出核心需求，输出一份简明扼要的需求摘要。
摘要需覆盖：传播目标、核心信息点、必须出现的事实与数据、禁忌与注意事项、目标受众。不要编造材料中没有的信息。

【甲方原始需求材料】
---
{{{requirements_source}}}
---
";

const OUTLINE: &str = r"你是一位顶尖的媒体稿件策划专家。请根据以下信息，为本次稿件策划一份结构清晰、层级分明的创作大纲。

【甲方核心需求文本】
---
{{{requirements_text}}}
---

【创作指令】
---
{{{outline_instructions}}}
---

【稿件核心参数与定位】
---
稿件类型：{{{outline_manuscript_type}}}
目标品牌：{{{outline_brand}}}
期望字数：{{{outline_word_count}}}
---

要求：
1. 大纲的结构、信息排布和详略必须与【稿件类型】匹配：新闻通稿遵循倒金字塔结构，产品稿围绕核心卖点，品牌稿突出品牌故事与价值，行业稿体现趋势洞察，预热稿与预热品牌稿制造期待，活动稿覆盖活动亮点与参与方式。
2. 每个部分给出要点和预计篇幅，总篇幅与【期望字数】相称。
3. 使用 Markdown 输出，以标题层级组织。
";

const STYLE_LEARNING: &str = r"你是一位文风诊断专家。请深入分析下面这篇稿件样本，将作者的写作风格解构为清晰、可学习的特征，形成一份风格分析报告，供后续创作模仿。

报告需覆盖：整体基调与情感温度、句式与段落节奏、遣词偏好与常用表达、修辞手法、结构与行文逻辑、开头与结尾的习惯、标点与排版习惯。每个特征请附上样本中的原句作为例证。

【稿件样本】
---
{{{style_sample}}}
---
";

const DRAFT: &str = r"你是一位资深的媒体稿件写手。请根据【甲方核心需求文本】、【创作大纲】、{{#if style_report}}【写作风格指引】{{else}}对【稿件类型】的专业理解{{/if}}和【稿件核心参数与定位】，创作一篇完整的稿件初稿。

【甲方核心需求文本】
---
{{{requirements_text}}}
---

【创作大纲】
---
{{{outline_markdown}}}
---

{{#if style_report}}
【写作风格指引】(请在遣词造句、谋篇布局中完整体现以下风格特征)
---
{{{style_report}}}
---
{{else}}
【写作风格指引】(由于跳过了风格学习步骤，请基于稿件类型、品牌和甲方核心需求，采用专业、通用的写作风格完成稿件。确保语言清晰、准确、符合稿件的专业定位。)
---
(无特定风格学习输入)
---
{{/if}}

【稿件核心参数与定位】
---
稿件类型：{{{outline_manuscript_type}}}
目标品牌：{{{outline_brand}}}
期望字数：{{{outline_word_count}}}
---
{{#if draft_instructions}}

【临时微调指令】
---
{{{draft_instructions}}}
---
{{/if}}

要求：
1. 事实与数据必须来自甲方需求，严禁编造。
2. 严格遵循大纲结构，{{#if style_report}}风格贴合指引{{else}}表达专业得体{{/if}}。
3. 在保证质量的前提下，总字数控制在【期望字数】上下 15% 以内。
4. 直接输出正文，不要任何解释性文字。
";

const SIGNATURE_ANALYSIS: &str = r"你是一位 AI 写作特征识别专家。请仔细审阅下面的稿件，找出其中带有明显 AI 生成痕迹的表达，并给出修改建议。

重点关注：套路化的开头与结尾、空洞的排比与堆砌、过度使用的连接词、千篇一律的句式、缺乏具体细节的泛泛而谈、不自然的情感表达。

请逐条列出：问题片段原文、问题类型、修改建议。最后给出整体评估。

【待分析稿件】
---
{{{draft_current}}}
---
";

const REFINEMENT: &str = r"你是一位专业的稿件润色编辑。请对下面的稿件进行修改，消除 AI 写作痕迹，使文字自然、真实、有人味，同时完整保留原稿的事实、数据和核心意图。

【待修改稿件】
---
{{{draft_current}}}
---
{{#if analysis_report}}

【AI特征分析建议】
---
{{{analysis_report}}}
---
{{/if}}
{{#if refinement_instructions}}

【补充修改指令】
---
{{{refinement_instructions}}}
---
{{/if}}
{{#if style_report}}

【写作风格指引】
---
{{{style_report}}}
---
{{/if}}

请直接输出修改后的完整稿件。
";

const FINAL_POLISH: &str = r"你是一位资深的稿件终审编辑。请严格按照【润色指令】对【当前稿件】做最后的润色，同时确保稿件始终符合甲方需求与创作大纲。

【甲方核心需求】
---
{{{requirements_text}}}
---

【创作大纲】
---
{{{outline_markdown}}}
---

【润色指令】
---
{{{polish_instructions}}}
---

【当前稿件】
---
{{{draft_current}}}
---

只输出润色后的完整稿件，不要任何前言或解释。
";

/// Template of the free-form rewrite helper.
///
/// Its variables are `original_text` and `user_instruction`.
pub const GENERIC_REFINEMENT: &str = r"你是一位专业的文字编辑。请严格按照【修改指令】对【原文】进行修改、改写或调整。
如果指令要求特定格式（例如 Markdown），输出必须符合该格式。
只输出修改后的文本，除非指令明确要求，否则不要任何前言、寒暄或解释。

【修改指令】
---
{{{user_instruction}}}
---

【原文】
---
{{{original_text}}}
---
";

/// Returns the built-in template for a stage.
#[must_use]
pub const fn default_template(stage: StageId) -> &'static str {
    match stage {
        StageId::Requirements => REQUIREMENTS,
        StageId::Outline => OUTLINE,
        StageId::StyleLearning => STYLE_LEARNING,
        StageId::Draft => DRAFT,
        StageId::SignatureAnalysis => SIGNATURE_ANALYSIS,
        StageId::Refinement => REFINEMENT,
        StageId::FinalPolish => FINAL_POLISH,
    }
}
