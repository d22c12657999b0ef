//! Scoring instruction sent to the model for one row.

use crate::domain::Row;

/// Build the examiner prompt for `row`. Pure and total.
///
/// The allowed range in the final line comes from the row's question number.
pub fn build_prompt(row: &Row) -> String {
    let range = row.score_range();
    format!(
        "Ты экзаменатор по русскому языку для иностранных граждан. Оцени ответ по критериям:\n\
         1. Мелкие ошибки и акцент не считаются.\n\
         2. Ответ должен быть по существу и решать коммуникативную задачу.\n\
         3. Предложения должны быть в основном полными.\n\
         Вопрос: {question}\n\
         Ответ экзаменуемого: {answer}\n\
         Поставь оценку от {min} до {max}. Ответ — только ЦЕЛОЕ число.",
        question = row.question_text,
        answer = row.answer_text,
        min = range.min,
        max = range.max,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(q: i64) -> Row {
        Row {
            question_number: q,
            question_text: "Как вас зовут?".to_string(),
            answer_text: "Меня зовут Анна".to_string(),
        }
    }

    #[test]
    fn embeds_question_and_answer() {
        let prompt = build_prompt(&row(2));
        assert!(prompt.contains("Вопрос: Как вас зовут?\n"));
        assert!(prompt.contains("Ответ экзаменуемого: Меня зовут Анна\n"));
    }

    #[test]
    fn range_follows_question_number() {
        assert!(build_prompt(&row(1)).ends_with("Поставь оценку от 0 до 1. Ответ — только ЦЕЛОЕ число."));
        assert!(build_prompt(&row(3)).contains("от 0 до 1"));
        assert!(build_prompt(&row(2)).contains("от 0 до 2"));
    }

    #[test]
    fn starts_with_examiner_role_and_rubric() {
        let prompt = build_prompt(&row(4));
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("Ты экзаменатор"));
        assert!(lines[1].starts_with("1. "));
        assert!(lines[3].starts_with("3. "));
    }
}
