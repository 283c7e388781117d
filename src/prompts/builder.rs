use crate::types::{Agent, Exchange, InteractionType};

use super::templates::{ProfessionTemplate, TemplateRegistry, PREAMBLE_DEFAULT};

/// Situation the speaker finds themselves in for a one-to-one exchange
#[derive(Debug, Clone, Default)]
pub struct ExchangeContext<'a> {
    pub location: &'a str,
    pub strength: i32,
    /// (min, max) characters the line should land in
    pub band: (usize, usize),
    pub history: &'a [Exchange],
    pub conflict: Option<&'a str>,
    pub memories: &'a [String],
}

/// The one builder every prompt in the town goes through
pub struct PromptBuilder {
    preamble: String,
    registry: TemplateRegistry,
}

impl PromptBuilder {
    pub fn new(preamble: impl Into<String>, registry: TemplateRegistry) -> Self {
        Self {
            preamble: preamble.into(),
            registry,
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn template(&self, profession: &str) -> ProfessionTemplate {
        self.registry.get_or_generic(profession)
    }

    /// First line from `speaker` to `listener`
    pub fn opener(&self, speaker: &Agent, listener: &Agent, ctx: &ExchangeContext<'_>) -> String {
        let task = format!(
            "You run into {} ({}) at the {}. Say something to start a conversation.",
            listener.name, listener.profession, ctx.location
        );
        self.compose(speaker, Some(listener), ctx, &task)
    }

    /// `speaker` answering `heard`, in the tone `kind` calls for. `insist`
    /// adds a stronger push for negative kinds after a reply came out too
    /// friendly.
    pub fn reply(
        &self,
        speaker: &Agent,
        listener: &Agent,
        kind: InteractionType,
        heard: &str,
        ctx: &ExchangeContext<'_>,
        insist: bool,
    ) -> String {
        let mut task = format!("{} just said to you: \"{}\"\n\n{}", listener.name, heard, reply_instruction(kind));
        if insist && kind.is_negative() {
            task.push_str(
                "\n\nYour previous answer was too friendly. This reply MUST clearly sound annoyed, \
                 disappointed or in disagreement. Do not apologize and do not ease the tension.",
            );
        }
        self.compose(speaker, Some(listener), ctx, &task)
    }

    /// Short closing remark from the opener after hearing the reply
    pub fn feedback(&self, speaker: &Agent, listener: &Agent, heard: &str, ctx: &ExchangeContext<'_>) -> String {
        let task = format!(
            "{} answered: \"{}\"\n\nReact briefly, in a few words.",
            listener.name, heard
        );
        self.compose(speaker, Some(listener), ctx, &task)
    }

    /// Opening line of a group discussion about `topic`
    pub fn group_opener(&self, speaker: &Agent, others: &[&Agent], topic: &str, ctx: &ExchangeContext<'_>) -> String {
        let names: Vec<&str> = others.iter().map(|a| a.name.as_str()).collect();
        let task = format!(
            "You are with {} at the {}. Bring up {} with the group.",
            names.join(", "),
            ctx.location,
            topic
        );
        self.compose(speaker, None, ctx, &task)
    }

    /// A participant's turn; `ctx.history` should hold only the last few turns
    pub fn group_reply(&self, speaker: &Agent, topic: &str, ctx: &ExchangeContext<'_>) -> String {
        let task = format!("The group is talking about {}. Add your own view in one or two sentences.", topic);
        self.compose(speaker, None, ctx, &task)
    }

    /// The group opener's brief reaction to one participant
    pub fn group_reaction(&self, speaker: &Agent, listener: &Agent, heard: &str, ctx: &ExchangeContext<'_>) -> String {
        let task = format!("{} said: \"{}\"\n\nReact to them briefly.", listener.name, heard);
        self.compose(speaker, Some(listener), ctx, &task)
    }

    /// A private thought
    pub fn think(&self, agent: &Agent, recent: &[String]) -> String {
        let mut sections = vec![self.preamble.clone(), self.persona(agent)];
        if !recent.is_empty() {
            sections.push(format!("## On your mind\n\n{}", bullet_list(recent)));
        }
        sections.push("Think to yourself in one sentence about your day or the people around you.".to_string());
        sections.join("\n\n---\n\n")
    }

    /// Answer to a message from the user
    pub fn chat(&self, agent: &Agent, message: &str, memories: &[String]) -> String {
        let mut sections = vec![self.preamble.clone(), self.persona(agent)];
        if !memories.is_empty() {
            sections.push(format!("## Things you remember\n\n{}", bullet_list(memories)));
        }
        sections.push(format!(
            "A visitor to the town says to you: \"{}\"\n\nAnswer them in one to three sentences.",
            message
        ));
        sections.join("\n\n---\n\n")
    }

    fn compose(&self, speaker: &Agent, listener: Option<&Agent>, ctx: &ExchangeContext<'_>, task: &str) -> String {
        let mut sections = vec![];

        // 1. Shared rules
        sections.push(self.preamble.clone());

        // 2. Who is speaking
        sections.push(self.persona(speaker));

        // 3. Relationship and any open conflict
        if let Some(listener) = listener {
            sections.push(format!(
                "## {}\n\n{} (strength {} out of 100)",
                listener.name,
                crate::relationship::classify(ctx.strength).description(),
                ctx.strength
            ));
        }
        if let Some(conflict) = ctx.conflict {
            sections.push(format!("## Tension between you\n\n{}", conflict));
        }

        // 4. Recent conversation
        if !ctx.history.is_empty() {
            let lines: Vec<String> = ctx
                .history
                .iter()
                .map(|e| format!("{}: {}", e.speaker, e.line))
                .collect();
            sections.push(format!("## Recently said\n\n{}", lines.join("\n")));
        }

        // 5. Memories
        if !ctx.memories.is_empty() {
            sections.push(format!("## Things you remember\n\n{}", bullet_list(ctx.memories)));
        }

        // 6. Task and length
        let (min, max) = ctx.band;
        if max > 0 {
            sections.push(format!("{}\n\nKeep it between {} and {} characters.", task, min, max));
        } else {
            sections.push(task.to_string());
        }

        sections.join("\n\n---\n\n")
    }

    fn persona(&self, agent: &Agent) -> String {
        let template = self.template(&agent.profession);
        format!(
            "## You\n\nYou are {}, a {}. You are {}. You speak in a {} way.\n\
             Right now you feel {} and your energy is {}/100.",
            agent.name,
            agent.profession,
            template.traits.join(", "),
            template.speaking_style,
            agent.mood,
            agent.energy
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(PREAMBLE_DEFAULT, TemplateRegistry::default())
    }
}

fn reply_instruction(kind: InteractionType) -> &'static str {
    match kind {
        InteractionType::FriendlyChat => "Answer warmly and with real interest.",
        InteractionType::CasualMeeting => "Answer politely but briefly, like a passing acquaintance.",
        InteractionType::Misunderstanding => {
            "You took what they said the wrong way. Answer with confusion or irritation; do not smooth it over."
        }
        InteractionType::Argument => {
            "You disagree with them. Push back and hold your position; do not apologize or soften."
        }
        InteractionType::Conflict => {
            "This touches the disagreement between you. Answer with clear frustration and stand your ground."
        }
        InteractionType::GroupDiscussion => "Answer as part of the group conversation.",
    }
}

fn bullet_list(items: &[String]) -> String {
    items.iter().map(|item| format!("- {}", item)).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (Agent, Agent) {
        (
            Agent::new("Alex", "programmer", "cafe"),
            Agent::new("Emma", "artist", "cafe"),
        )
    }

    #[test]
    fn opener_includes_persona_history_and_band() {
        let builder = PromptBuilder::default();
        let (alex, emma) = pair();
        let history = vec![Exchange::new("Emma", "Alex", "Nice sketch, right?")];
        let ctx = ExchangeContext {
            location: "cafe",
            strength: 72,
            band: (30, 140),
            history: &history,
            ..Default::default()
        };

        let prompt = builder.opener(&alex, &emma, &ctx);
        assert!(prompt.contains("You are Alex, a programmer"));
        assert!(prompt.contains("Emma: Nice sketch, right?"));
        assert!(prompt.contains("between 30 and 140 characters"));
        assert!(prompt.contains("strength 72"));
    }

    #[test]
    fn insisting_only_applies_to_negative_kinds() {
        let builder = PromptBuilder::default();
        let (alex, emma) = pair();
        let ctx = ExchangeContext {
            location: "cafe",
            strength: 40,
            band: (20, 100),
            ..Default::default()
        };

        let argument = builder.reply(&alex, &emma, InteractionType::Argument, "Hi", &ctx, true);
        assert!(argument.contains("MUST clearly sound annoyed"));
        let friendly = builder.reply(&alex, &emma, InteractionType::FriendlyChat, "Hi", &ctx, true);
        assert!(!friendly.contains("MUST"));
    }

    #[test]
    fn conflict_context_is_quoted() {
        let builder = PromptBuilder::default();
        let (alex, emma) = pair();
        let ctx = ExchangeContext {
            location: "park",
            strength: 50,
            band: (20, 100),
            conflict: Some("They are in a mild disagreement about money."),
            ..Default::default()
        };
        assert!(builder.opener(&alex, &emma, &ctx).contains("mild disagreement about money"));
    }

    #[test]
    fn chat_lists_memories() {
        let builder = PromptBuilder::default();
        let (alex, _) = pair();
        let prompt = builder.chat(&alex, "How's work?", &["Fixed a nasty bug".to_string()]);
        assert!(prompt.contains("- Fixed a nasty bug"));
        assert!(prompt.contains("How's work?"));
    }
}
