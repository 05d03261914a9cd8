use crate::model::{Lesson, LessonDraft, LessonId, QuestionDraft, QuestionId};

fn question(
    id: u64,
    prompt: &str,
    options: [&str; 4],
    correct: usize,
    explanation: &str,
) -> QuestionDraft {
    QuestionDraft {
        id: QuestionId::new(id),
        prompt: prompt.to_string(),
        options: options.iter().map(|o| (*o).to_string()).collect(),
        correct,
        explanation: explanation.to_string(),
    }
}

fn drafts() -> Vec<LessonDraft> {
    vec![
        LessonDraft {
            id: LessonId::new(1),
            title: "Sarah's First Credit Card".into(),
            description: "Help Sarah make smart decisions with her first credit card".into(),
            story: "Sarah just got her first job out of college and received a credit card \
                    offer in the mail. She's excited about the opportunity to build her credit \
                    but nervous about making mistakes. Let's help Sarah make smart decisions!"
                .into(),
            points: 100,
            questions: vec![
                question(
                    1,
                    "Sarah's credit card has a $3,000 limit. What's the maximum balance she \
                     should maintain to help her credit score?",
                    [
                        "$3,000 - use it all to build credit faster",
                        "$2,400 - 80% of the limit",
                        "$900 - 30% of the limit",
                        "$0 - never use credit cards",
                    ],
                    2,
                    "It's best to keep your credit utilization below 30%. For a $3,000 limit, \
                     try to keep your balance under $900. This shows lenders you can manage \
                     credit responsibly without relying too heavily on it.",
                ),
                question(
                    2,
                    "Sarah forgot to pay her credit card bill last month. What should she do?",
                    [
                        "Ignore it, one missed payment isn't a big deal",
                        "Call the credit card company immediately and make the payment",
                        "Wait for the next bill and pay double",
                        "Close the credit card account",
                    ],
                    1,
                    "Contact your credit card company immediately! A late payment can hurt \
                     your credit score, but many companies will waive the late fee for \
                     first-time mistakes if you act quickly and have a good payment history.",
                ),
            ],
        },
        LessonDraft {
            id: LessonId::new(2),
            title: "Maya's Debt Dilemma".into(),
            description: "Help Maya create a plan to tackle her student loans and credit card debt"
                .into(),
            story: "Maya has graduated with $25,000 in student loans and $3,000 in credit card \
                    debt from emergencies during school. She's starting a new job and wants to \
                    create a debt repayment strategy."
                .into(),
            points: 100,
            questions: vec![question(
                1,
                "Which debt should Maya prioritize paying off first?",
                [
                    "Student loans because the balance is higher",
                    "Split payments equally between both debts",
                    "Credit card debt because of higher interest rates",
                    "Whichever loan has the lowest balance",
                ],
                2,
                "Credit card debt typically has much higher interest rates (15-25%) compared to \
                 student loans (4-7%). Prioritizing high-interest debt while making minimum \
                 payments on other debts will save you more money in the long run.",
            )],
        },
        LessonDraft {
            id: LessonId::new(3),
            title: "Lisa's Credit Building Journey".into(),
            description: "Guide Lisa through building her credit score from scratch".into(),
            story: "Lisa is 22 and has no credit history. She's been denied for apartments and \
                    realizes she needs to start building her credit. Let's help her get started \
                    on the right path!"
                .into(),
            points: 100,
            questions: vec![question(
                1,
                "What's the best first step for Lisa to start building credit?",
                [
                    "Apply for multiple credit cards at once",
                    "Get a secured credit card",
                    "Take out a personal loan",
                    "Become an authorized user on someone's credit card",
                ],
                1,
                "A secured credit card is perfect for building credit. You provide a security \
                 deposit that becomes your credit limit, minimizing the bank's risk. This makes \
                 it easier to get approved with no credit history.",
            )],
        },
    ]
}

/// Validated built-in lessons.
///
/// # Panics
///
/// Panics if the static content above fails validation.
pub(crate) fn lessons() -> Vec<Lesson> {
    drafts()
        .into_iter()
        .map(|d| d.validate().expect("built-in lesson content should be valid"))
        .collect()
}
