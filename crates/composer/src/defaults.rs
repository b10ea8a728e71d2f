//! The built-in section plan, used when the config declares no sections.

use crate::loader::LoaderKind;
use crate::section::{Condition, FallbackPolicy, SectionDefinition};

fn custom(name: &str) -> Condition {
    Condition::Custom(name.to_string())
}

/// Section definitions for a complete tutoring document.
pub fn default_sections() -> Vec<SectionDefinition> {
    vec![
        SectionDefinition::new("quick_start", "Quick Start")
            .priority(5)
            .assembled()
            .transform("quick_start")
            .depends_on(&[
                "caller_info",
                "identity",
                "session_plan",
                "memories",
                "behavior_targets",
            ]),
        SectionDefinition::new("caller_info", "Caller")
            .priority(10)
            .source(LoaderKind::Profile)
            .source(LoaderKind::SessionCount)
            .condition(Condition::DataExists)
            .transform("caller_info"),
        SectionDefinition::new("identity", "Identity")
            .priority(20)
            .condition(custom("identity_spec"))
            .fallback(FallbackPolicy::Null)
            .transform("extract_identity"),
        SectionDefinition::new("content", "Content")
            .priority(30)
            .condition(Condition::ContentSpec)
            .fallback(FallbackPolicy::Null)
            .transform("extract_content"),
        SectionDefinition::new("voice", "Voice")
            .priority(40)
            .condition(custom("voice_spec"))
            .fallback(FallbackPolicy::Null)
            .transform("extract_voice"),
        SectionDefinition::new("curriculum", "Curriculum")
            .priority(50)
            .condition(custom("has_modules"))
            .transform("compute_curriculum"),
        SectionDefinition::new("personality", "Personality")
            .priority(60)
            .source(LoaderKind::Personality)
            .condition(Condition::DataExists)
            .transform("map_personality"),
        SectionDefinition::new("learner_profile", "Learner Profile")
            .priority(70)
            .source(LoaderKind::LearnerProfile)
            .condition(Condition::DataExists)
            .transform("map_learner_profile"),
        SectionDefinition::new("memories", "Memories")
            .priority(80)
            .source(LoaderKind::Memories)
            .condition(Condition::DataExists)
            .fallback(FallbackPolicy::EmptyObject)
            .chain(&["dedupe_memories", "score_memory_relevance", "group_memories"]),
        SectionDefinition::new("behavior_targets", "Behavior Targets")
            .priority(90)
            .source(LoaderKind::BehaviorTargets)
            .source(LoaderKind::CallerTargets)
            .condition(Condition::DataExists)
            .fallback(FallbackPolicy::EmptyObject)
            .transform("merge_targets"),
        SectionDefinition::new("goals", "Goals")
            .priority(100)
            .source(LoaderKind::Goals)
            .condition(Condition::DataExists)
            .transform("filter_goals"),
        SectionDefinition::new("session_plan", "Session Plan")
            .priority(110)
            .transform("plan_session"),
        SectionDefinition::new("voice_rules", "Voice Rules")
            .priority(120)
            .assembled()
            .transform("voice_rules")
            .depends_on(&["behavior_targets"]),
        SectionDefinition::new("trust", "Sources")
            .priority(130)
            .source(LoaderKind::SubjectSources)
            .condition(Condition::DataExists)
            .transform("source_authority"),
        SectionDefinition::new("teaching_points", "Teaching Points")
            .priority(140)
            .source(LoaderKind::Assertions)
            .source(LoaderKind::Questions)
            .source(LoaderKind::Vocabulary)
            .condition(Condition::DataExists)
            .transform("teaching_points"),
        SectionDefinition::new("activities", "Activities")
            .priority(150)
            .source(LoaderKind::Questions)
            .condition(custom("has_modules"))
            .transform("recommend_activities"),
        SectionDefinition::new("onboarding", "Onboarding")
            .priority(160)
            .source(LoaderKind::Onboarding)
            .condition(custom("onboarding_incomplete"))
            .transform("onboarding_status"),
        SectionDefinition::new("pending_actions", "Pending Actions")
            .priority(170)
            .source(LoaderKind::OpenActions)
            .condition(Condition::DataExists)
            .transform("pending_actions"),
        SectionDefinition::new("critical_rules", "Critical Rules")
            .priority(180)
            .transform("critical_rules"),
        SectionDefinition::new("instructions", "Instructions")
            .priority(200)
            .assembled()
            .transform("compose_instructions")
            .depends_on(&[
                "identity",
                "session_plan",
                "voice_rules",
                "personality",
                "learner_profile",
                "memories",
                "goals",
                "critical_rules",
            ]),
    ]
}
