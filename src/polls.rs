/*!
 * Questions, choices and tags, and the vote counters that tie them together.
 */
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::api_models::{Ballot, ChoiceTally, VoteSnapshot};
use crate::db::lookups::{Filter, Lookup};
use crate::db::{Databases, ModelKind};
use crate::error::{AppError, AppResult};
use crate::models::{Choice, Question, Tag};
use crate::pagination::{self, Page};
use crate::templates::MEDIA_URL;

pub const PAGE_SIZE: i64 = 10;

/**
 * Count one vote for a choice.
 *
 * Both counters move together or not at all: the relative updates run in a
 * single transaction, and a choice that does not belong to the question is
 * treated as missing.
 */
pub async fn record_vote(dbs: &Databases, ballot: &Ballot) -> AppResult<VoteSnapshot> {
    debug_assert_eq!(
        dbs.alias_for_write(ModelKind::Choice),
        dbs.alias_for_write(ModelKind::Question)
    );
    let mut tx = dbs.writer(ModelKind::Choice).begin().await?;

    let choice = sqlx::query("UPDATE choices SET votes = votes + 1 WHERE id = ? AND question_id = ?")
        .bind(ballot.choice_id)
        .bind(ballot.question_id)
        .execute(&mut *tx)
        .await?;
    if choice.rows_affected() == 0 {
        return Err(AppError::not_found("choice", ballot.choice_id));
    }

    let question = sqlx::query("UPDATE questions SET total_votes = total_votes + 1 WHERE id = ?")
        .bind(ballot.question_id)
        .execute(&mut *tx)
        .await?;
    if question.rows_affected() == 0 {
        return Err(AppError::not_found("question", ballot.question_id));
    }

    tx.commit().await?;
    info!("Vote recorded: {:?}", ballot);

    snapshot(dbs, ballot.question_id).await
}

/**
 * Current totals for a question and every one of its choices
 */
pub async fn snapshot(dbs: &Databases, question_id: i64) -> AppResult<VoteSnapshot> {
    let question = find_question(dbs, question_id)
        .await?
        .ok_or_else(|| AppError::not_found("question", question_id))?;

    let choices_data: BTreeMap<i64, ChoiceTally> = choices_for(dbs, &[question.id])
        .await?
        .into_iter()
        .map(|c| {
            (
                c.id,
                ChoiceTally {
                    title: c.title,
                    votes: c.votes,
                },
            )
        })
        .collect();

    Ok(VoteSnapshot {
        question_total_votes: question.total_votes,
        choices_data,
    })
}

pub async fn find_question(dbs: &Databases, id: i64) -> AppResult<Option<Question>> {
    Ok(sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = ?")
        .bind(id)
        .fetch_optional(dbs.reader(ModelKind::Question))
        .await?)
}

/// Choices of the given questions, in creation order
pub async fn choices_for(dbs: &Databases, question_ids: &[i64]) -> AppResult<Vec<Choice>> {
    if question_ids.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = vec!["?"; question_ids.len()].join(", ");
    let sql = format!(
        "SELECT * FROM choices WHERE question_id IN ({}) ORDER BY id",
        placeholders
    );
    let mut query = sqlx::query_as::<_, Choice>(&sql);
    for id in question_ids {
        query = query.bind(*id);
    }
    Ok(query.fetch_all(dbs.reader(ModelKind::Choice)).await?)
}

pub struct NewQuestion {
    pub title: String,
    pub question_image: Option<String>,
    pub question_tag_id: Option<i64>,
    pub choices: Vec<String>,
}

/**
 * Insert a question and one choice per non-blank choice title
 */
pub async fn create_question(dbs: &Databases, new: NewQuestion) -> AppResult<Question> {
    let now = Utc::now();
    let mut tx = dbs.writer(ModelKind::Question).begin().await?;

    let question = sqlx::query_as::<_, Question>(
        "INSERT INTO questions (title, created, modified, question_image, question_tag_id)
         VALUES (?, ?, ?, ?, ?)
         RETURNING *",
    )
    .bind(&new.title)
    .bind(now)
    .bind(now)
    .bind(&new.question_image)
    .bind(new.question_tag_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut created = 0;
    for title in new.choices.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        sqlx::query("INSERT INTO choices (title, created, modified, question_id) VALUES (?, ?, ?, ?)")
            .bind(title)
            .bind(now)
            .bind(now)
            .bind(question.id)
            .execute(&mut *tx)
            .await?;
        created += 1;
    }

    tx.commit().await?;
    info!("Created question {} ({}) with {} choices", question.id, question, created);
    Ok(question)
}

pub async fn create_tag(dbs: &Databases, title: &str) -> AppResult<Tag> {
    Ok(
        sqlx::query_as::<_, Tag>("INSERT INTO tags (title) VALUES (?) RETURNING *")
            .bind(title)
            .fetch_one(dbs.writer(ModelKind::Tag))
            .await?,
    )
}

pub async fn find_tag(dbs: &Databases, id: i64) -> AppResult<Option<Tag>> {
    Ok(sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(dbs.reader(ModelKind::Tag))
        .await?)
}

pub async fn find_tag_by_title(dbs: &Databases, title: &str) -> AppResult<Option<Tag>> {
    Ok(sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE title = ?")
        .bind(title)
        .fetch_optional(dbs.reader(ModelKind::Tag))
        .await?)
}

pub async fn list_tags(dbs: &Databases) -> AppResult<Vec<Tag>> {
    Ok(sqlx::query_as::<_, Tag>("SELECT * FROM tags ORDER BY title")
        .fetch_all(dbs.reader(ModelKind::Tag))
        .await?)
}

/**
 * Query-string options for the question index
 */
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct IndexQuery {
    pub page: Option<String>,
    pub tag: Option<i64>,
    pub exclude_tag: Option<i64>,
    pub votes_below: Option<i64>,
}

impl IndexQuery {
    /// Only published questions, plus whatever the visitor asked for
    pub fn filter(&self, now: DateTime<Utc>) -> Filter {
        let mut filter = Filter::new().and("created", Lookup::Lte, now);
        if let Some(tag) = self.tag {
            filter = filter.and("question_tag_id", Lookup::Exact, tag);
        }
        if let Some(tag) = self.exclude_tag {
            filter = filter.and("question_tag_id", Lookup::NotEqual, tag);
        }
        if let Some(votes) = self.votes_below {
            filter = filter.and("total_votes", Lookup::AbsLt, votes);
        }
        filter
    }

    /// Active filters as `&key=value` pairs, for page links
    pub fn link_params(&self) -> String {
        [
            ("tag", self.tag),
            ("exclude_tag", self.exclude_tag),
            ("votes_below", self.votes_below),
        ]
        .iter()
        .filter_map(|(key, value)| value.map(|v| format!("&{}={}", key, v)))
        .collect()
    }
}

/**
 * A question as the index page shows it
 */
#[derive(Debug, Serialize)]
pub struct QuestionCard {
    #[serde(flatten)]
    pub question: Question,
    pub tag: Option<Tag>,
    pub choices: Vec<Choice>,
    pub thumbnail: String,
    pub recent: bool,
}

/**
 * Newest-first page of published questions with their choices and tags
 */
pub async fn index(dbs: &Databases, query: &IndexQuery) -> AppResult<Page<QuestionCard>> {
    let now = Utc::now();
    let filter = query.filter(now);
    let pool = dbs.reader(ModelKind::Question);

    let count_sql = format!("SELECT COUNT(*) FROM questions{}", filter.where_clause());
    let (count,): (i64,) = filter.bind(sqlx::query_as(&count_sql)).fetch_one(pool).await?;

    let window = pagination::window(query.page.as_deref(), count, PAGE_SIZE)?;

    let list_sql = format!(
        "SELECT * FROM questions{} ORDER BY created DESC, id DESC LIMIT ? OFFSET ?",
        filter.where_clause()
    );
    let questions: Vec<Question> = filter
        .bind(sqlx::query_as(&list_sql))
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(pool)
        .await?;

    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
    let mut choices: HashMap<i64, Vec<Choice>> = HashMap::new();
    for choice in choices_for(dbs, &ids).await? {
        choices.entry(choice.question_id).or_default().push(choice);
    }
    let tags: HashMap<i64, Tag> = list_tags(dbs).await?.into_iter().map(|t| (t.id, t)).collect();

    let cards = questions
        .into_iter()
        .map(|question| QuestionCard {
            tag: question.question_tag_id.and_then(|id| tags.get(&id).cloned()),
            choices: choices.remove(&question.id).unwrap_or_default(),
            thumbnail: question.thumbnail_preview(MEDIA_URL),
            recent: question.was_published_recently(now),
            question,
        })
        .collect();

    Ok(Page::new(cards, window, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    async fn poll(dbs: &Databases, title: &str, choices: &[&str]) -> Question {
        create_question(
            dbs,
            NewQuestion {
                title: title.into(),
                question_image: None,
                question_tag_id: None,
                choices: choices.iter().map(|c| c.to_string()).collect(),
            },
        )
        .await
        .unwrap()
    }

    #[async_std::test]
    async fn creates_one_choice_per_non_blank_title() {
        let dir = tempfile::tempdir().unwrap();
        let dbs = testing::databases(&dir).await;

        let q = poll(&dbs, "Tabs or spaces?", &["Tabs", "", "  ", "Spaces", "Both"]).await;
        let choices = choices_for(&dbs, &[q.id]).await.unwrap();

        let titles: Vec<&str> = choices.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Tabs", "Spaces", "Both"]);
        assert!(choices.iter().all(|c| c.question_id == q.id && c.votes == 0));
        assert_eq!(q.total_votes, 0);
    }

    #[async_std::test]
    async fn vote_moves_both_counters_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let dbs = testing::databases(&dir).await;
        let q = poll(&dbs, "Tea or coffee?", &["Tea", "Coffee"]).await;
        let choices = choices_for(&dbs, &[q.id]).await.unwrap();
        let (tea, coffee) = (choices[0].id, choices[1].id);

        let ballot = Ballot {
            choice_id: coffee,
            question_id: q.id,
        };
        record_vote(&dbs, &ballot).await.unwrap();
        let snapshot = record_vote(&dbs, &ballot).await.unwrap();

        assert_eq!(snapshot.question_total_votes, 2);
        assert_eq!(snapshot.choices_data.len(), 2);
        assert_eq!(
            snapshot.choices_data[&coffee],
            ChoiceTally {
                title: "Coffee".into(),
                votes: 2
            }
        );
        assert_eq!(snapshot.choices_data[&tea].votes, 0);
    }

    #[async_std::test]
    async fn unknown_or_foreign_choice_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dbs = testing::databases(&dir).await;
        let q = poll(&dbs, "Cats or dogs?", &["Cats", "Dogs"]).await;
        let other = poll(&dbs, "Left or right?", &["Left"]).await;
        let foreign = choices_for(&dbs, &[other.id]).await.unwrap()[0].id;

        for choice_id in [9999, foreign] {
            let err = record_vote(
                &dbs,
                &Ballot {
                    choice_id,
                    question_id: q.id,
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::NotFound { resource: "choice", .. }));
        }

        let after = snapshot(&dbs, q.id).await.unwrap();
        assert_eq!(after.question_total_votes, 0);
        assert!(after.choices_data.values().all(|c| c.votes == 0));
        assert_eq!(snapshot(&dbs, other.id).await.unwrap().question_total_votes, 0);
    }

    #[async_std::test]
    async fn concurrent_votes_are_all_counted() {
        let dir = tempfile::tempdir().unwrap();
        let dbs = testing::databases(&dir).await;
        let q = poll(&dbs, "Spring or autumn?", &["Spring", "Autumn"]).await;
        let spring = choices_for(&dbs, &[q.id]).await.unwrap()[0].id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dbs = dbs.clone();
                async_std::task::spawn(async move {
                    record_vote(
                        &dbs,
                        &Ballot {
                            choice_id: spring,
                            question_id: q.id,
                        },
                    )
                    .await
                    .expect("vote failed")
                })
            })
            .collect();
        for handle in handles {
            handle.await;
        }

        let after = snapshot(&dbs, q.id).await.unwrap();
        assert_eq!(after.question_total_votes, 8);
        assert_eq!(after.choices_data[&spring].votes, 8);
    }

    #[async_std::test]
    async fn index_pages_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let dbs = testing::databases(&dir).await;
        let anime = create_tag(&dbs, "anime").await.unwrap();

        for i in 0..12 {
            create_question(
                &dbs,
                NewQuestion {
                    title: format!("Sample Poll Question {}", i),
                    question_image: None,
                    question_tag_id: (i % 3 == 0).then(|| anime.id),
                    choices: vec![format!("Option {}B", i)],
                },
            )
            .await
            .unwrap();
        }

        let first = index(&dbs, &IndexQuery::default()).await.unwrap();
        assert_eq!((first.count, first.num_pages, first.items.len()), (12, 2, 10));
        assert_eq!(first.items[0].question.title, "Sample Poll Question 11");
        assert_eq!(first.items[0].choices.len(), 1);
        assert!(first.items[0].recent);

        let last = index(
            &dbs,
            &IndexQuery {
                page: Some("last".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(last.items.len(), 2);

        let tagged = index(
            &dbs,
            &IndexQuery {
                tag: Some(anime.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(tagged.count, 4);
        assert!(tagged.items.iter().all(|c| c.tag.as_ref().map(|t| t.id) == Some(anime.id)));

        // NULL tags never compare unequal, matching SQL semantics
        let untagged_excluded = index(
            &dbs,
            &IndexQuery {
                exclude_tag: Some(anime.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(untagged_excluded.count, 0);

        let quiet = index(
            &dbs,
            &IndexQuery {
                votes_below: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(quiet.count, 12);

        assert!(matches!(
            index(
                &dbs,
                &IndexQuery {
                    page: Some("3".into()),
                    ..Default::default()
                }
            )
            .await,
            Err(AppError::NotFound { .. })
        ));
    }
}
