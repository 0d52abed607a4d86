use chrono::Utc;
use log::info;
use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, http::Status, serde::json::Json, Route};
use serde::Deserialize;

use crate::{
    api::common::token_account,
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            pagination::{Paginated, Pagination},
            review::{ReviewDescription, ReviewSpec, ReviewSummary, MAX_RATING, MIN_RATING},
        },
        db::{
            review::{NewReview, Review},
            user::User,
        },
        mongodb::{Coll, Id},
    },
};

/// Longest comment accepted, in characters.
const MAX_COMMENT_LENGTH: usize = 2000;

pub fn routes() -> Vec<Route> {
    routes![list_reviews, review_summary, create_review, delete_review]
}

#[get("/reviews")]
async fn list_reviews(
    pagination: Pagination,
    reviews: Coll<Review>,
) -> Result<Json<Paginated<ReviewDescription>>> {
    let total = reviews.count_documents(None, None).await?;
    let options = FindOptions::builder()
        .sort(doc! { "created_at": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit())
        .build();
    let page: Vec<ReviewDescription> = reviews
        .find(None, options)
        .await?
        .map_ok(ReviewDescription::from)
        .try_collect()
        .await?;
    Ok(Json(pagination.page(page, total)))
}

/// Just the rating of a review.
#[derive(Deserialize)]
struct Rating {
    rating: u8,
}

#[get("/reviews/summary")]
async fn review_summary(reviews: Coll<Review>) -> Result<Json<ReviewSummary>> {
    let options = FindOptions::builder()
        .projection(doc! { "_id": 0, "rating": 1 })
        .build();
    let ratings: Vec<Rating> = reviews
        .clone_with_type::<Rating>()
        .find(None, options)
        .await?
        .try_collect()
        .await?;
    Ok(Json(ReviewSummary::new(ratings.into_iter().map(|r| r.rating))))
}

#[post("/reviews", data = "<spec>", format = "json")]
async fn create_review(
    token: AuthToken<User>,
    spec: Json<ReviewSpec>,
    users: Coll<User>,
    new_reviews: Coll<NewReview>,
) -> Result<(Status, Json<ReviewDescription>)> {
    if !spec.is_valid_rating() {
        return Err(Error::bad_request(format!(
            "Rating must be between {MIN_RATING} and {MAX_RATING}"
        )));
    }
    let comment = spec.comment.trim();
    if comment.chars().count() > MAX_COMMENT_LENGTH {
        return Err(Error::bad_request(format!(
            "Comments are limited to {MAX_COMMENT_LENGTH} characters"
        )));
    }

    let author = token_account(&token, &users).await?;
    let review = NewReview {
        user_id: author.id,
        author_name: author.name.clone(),
        rating: spec.rating,
        comment: comment.to_string(),
        created_at: Utc::now(),
    };
    let review_id: Id = new_reviews
        .insert_one(&review, None)
        .await?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| Error::internal("Inserted review has no ObjectId"))?
        .into();
    info!("User {} left a {}-star review", author.id, review.rating);

    let review = Review {
        id: review_id,
        review,
    };
    Ok((Status::Created, Json(review.into())))
}

#[delete("/reviews/<review_id>")]
async fn delete_review(
    token: AuthToken<User>,
    review_id: Id,
    reviews: Coll<Review>,
) -> Result<()> {
    let review = reviews
        .find_one(review_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Review {review_id}")))?;
    if !token.is_admin() && review.user_id != token.id {
        return Err(Error::forbidden("Only the author or an admin may delete a review"));
    }
    reviews.delete_one(review_id.as_doc(), None).await?;
    info!("Deleted review {review_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::{api::auth::Bearer, db::user::NewUser};

    use super::*;

    async fn post_review(client: &Client, bearer: &Bearer, spec: &ReviewSpec) -> ReviewDescription {
        let response = client
            .post(uri!("/api", create_review))
            .header(bearer.header())
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        response.into_json().await.unwrap()
    }

    #[backend_test(organizer)]
    async fn post_list_and_summarise(client: Client, bearer: Bearer) {
        let response = client.get(uri!("/api", review_summary)).dispatch().await;
        let summary: ReviewSummary = response.into_json().await.unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(summary.average_rating, None);

        let first = post_review(&client, &bearer, &ReviewSpec::example()).await;
        assert_eq!(first.author_name, NewUser::example_organizer().name);
        let second = post_review(
            &client,
            &bearer,
            &ReviewSpec {
                rating: 5,
                comment: "  Even better the second time  ".to_string(),
            },
        )
        .await;
        assert_eq!(second.comment, "Even better the second time");

        let response = client.get("/api/reviews").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let page: Paginated<ReviewDescription> = response.into_json().await.unwrap();
        assert_eq!(page.pagination.total, 2);
        // Newest first.
        assert_eq!(page.items[0].id, second.id);
        assert_eq!(page.items[1].id, first.id);

        let response = client
            .get("/api/reviews?page_num=2&page_size=1")
            .dispatch()
            .await;
        let page: Paginated<ReviewDescription> = response.into_json().await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, first.id);

        let response = client.get(uri!("/api", review_summary)).dispatch().await;
        let summary: ReviewSummary = response.into_json().await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average_rating, Some(4.5));
    }

    #[backend_test]
    async fn huge_page_numbers_are_rejected(client: Client) {
        let response = client
            .get("/api/reviews?page_num=1000000000000000000&page_size=100")
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[backend_test(organizer)]
    async fn ratings_are_bounded(client: Client, bearer: Bearer, reviews: Coll<Review>) {
        for rating in [0, 6] {
            let response = client
                .post(uri!("/api", create_review))
                .header(bearer.header())
                .header(ContentType::JSON)
                .body(json!({ "rating": rating, "comment": "" }).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::BadRequest);
        }
        assert_eq!(reviews.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test]
    async fn anonymous_cannot_review(client: Client) {
        let response = client
            .post(uri!("/api", create_review))
            .header(ContentType::JSON)
            .body(json!(ReviewSpec::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[backend_test(organizer)]
    async fn only_author_or_admin_deletes(
        client: Client,
        bearer: Bearer,
        new_users: Coll<NewUser>,
        reviews: Coll<Review>,
    ) {
        let review = post_review(&client, &bearer, &ReviewSpec::example()).await;
        let review_id: Id = review.id.parse().unwrap();

        new_users
            .insert_one(NewUser::example_organizer2(), None)
            .await
            .unwrap();
        let response = client
            .post("/api/users/login")
            .header(ContentType::JSON)
            .body(json!(crate::model::api::auth::LoginRequest::example_organizer2()).to_string())
            .dispatch()
            .await;
        let auth: crate::model::api::auth::AuthResponse = response.into_json().await.unwrap();
        let other = Bearer(auth.token);

        let response = client
            .delete(uri!("/api", delete_review(review_id)))
            .header(other.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .delete(uri!("/api", delete_review(review_id)))
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(reviews.count_documents(None, None).await.unwrap(), 0);

        let response = client
            .delete(uri!("/api", delete_review(review_id)))
            .header(bearer.header())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }
}
