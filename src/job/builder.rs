use crate::job::{CardDetails, JobSpec, OwnerId, PassengerComposition, SearchCriteria};
use crate::provider::{ProviderKind, SeatPreference};

/// Consuming builder for [`JobSpec`].
///
/// Every field has a workable default; callers set what they need and
/// [`build`](JobSpecBuilder::build).
pub struct JobSpecBuilder {
    owner: OwnerId,
    provider: ProviderKind,
    criteria: Option<SearchCriteria>,
    candidates: Vec<usize>,
    passengers: PassengerComposition,
    seat_preference: SeatPreference,
    card: Option<CardDetails>,
}

impl Default for JobSpecBuilder {
    fn default() -> Self {
        Self {
            owner: OwnerId::from(0),
            provider: ProviderKind::Srt,
            criteria: None,
            candidates: Vec::new(),
            passengers: Default::default(),
            seat_preference: SeatPreference::GeneralFirst,
            card: None,
        }
    }
}

impl JobSpecBuilder {
    pub fn owner(self, owner: OwnerId) -> Self {
        Self { owner, ..self }
    }

    pub fn provider(self, provider: ProviderKind) -> Self {
        Self { provider, ..self }
    }

    pub fn criteria(self, criteria: SearchCriteria) -> Self {
        Self {
            criteria: Some(criteria),
            ..self
        }
    }

    /// Candidate positions in the search result, in preference order.
    pub fn candidates(self, candidates: Vec<usize>) -> Self {
        Self { candidates, ..self }
    }

    pub fn passengers(self, passengers: PassengerComposition) -> Self {
        Self { passengers, ..self }
    }

    pub fn seat_preference(self, seat_preference: SeatPreference) -> Self {
        Self {
            seat_preference,
            ..self
        }
    }

    /// Enable auto-pay with the given card.
    pub fn auto_pay(self, card: CardDetails) -> Self {
        Self {
            card: Some(card),
            ..self
        }
    }

    pub fn build(self) -> JobSpec {
        JobSpec {
            owner: self.owner,
            provider: self.provider,
            criteria: self.criteria.unwrap_or(SearchCriteria {
                departure: String::new(),
                arrival: String::new(),
                date: String::new(),
                time: String::new(),
            }),
            candidates: self.candidates,
            passengers: self.passengers,
            seat_preference: self.seat_preference,
            auto_pay: self.card.is_some(),
            card: self.card,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_a_spec() {
        let spec = JobSpec::builder()
            .owner(OwnerId::from(7))
            .provider(ProviderKind::Ktx)
            .criteria(SearchCriteria {
                departure: "서울".into(),
                arrival: "부산".into(),
                date: "20260301".into(),
                time: "060000".into(),
            })
            .candidates(vec![1, 0, 3])
            .passengers(PassengerComposition::adults(2))
            .seat_preference(SeatPreference::SpecialOnly)
            .build();

        assert_eq!(spec.owner, OwnerId::from(7));
        assert_eq!(spec.provider, ProviderKind::Ktx);
        assert_eq!(spec.candidates, vec![1, 0, 3]);
        assert_eq!(spec.passengers.total(), 2);
        assert!(!spec.auto_pay);
        assert!(spec.card.is_none());
    }

    #[test]
    fn auto_pay_requires_a_card() {
        let spec = JobSpec::builder()
            .auto_pay(CardDetails {
                number: "1111222233334444".into(),
                password: "12".into(),
                birthday: "900101".into(),
                expiry: "2028-01".into(),
            })
            .build();

        assert!(spec.auto_pay);
        assert!(spec.card.is_some());
    }
}
