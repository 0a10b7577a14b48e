//! Solidity interfaces of the indexed contracts.

use alloy_sol_types::sol;

sol! {
    /// ERC20Votes token.
    interface IVotesToken {
        event Transfer(address indexed from, address indexed to, uint256 value);
        event DelegateChanged(
            address indexed delegator,
            address indexed fromDelegate,
            address indexed toDelegate
        );
        event DelegateVotesChanged(
            address indexed delegate,
            uint256 previousVotes,
            uint256 newVotes
        );
    }

    /// ERC721Votes token: same signatures, the token id is indexed.
    interface IVotesNft {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }

    interface IGovernor {
        event ProposalCreated(
            uint256 proposalId,
            address proposer,
            address[] targets,
            uint256[] values,
            string[] signatures,
            bytes[] calldatas,
            uint256 voteStart,
            uint256 voteEnd,
            string description
        );
        event VoteCast(
            address indexed voter,
            uint256 proposalId,
            uint8 support,
            uint256 weight,
            string reason
        );
    }
}
